//! Pure domain logic for the streaming fleet scheduler.
//!
//! Nothing in this crate performs I/O. The `db`, `fleet` and `api` crates
//! fetch state, hand it to these functions and persist the outcome.

pub mod agent;
pub mod allocation;
pub mod counters;
pub mod error;
pub mod health;
pub mod job_spec;
pub mod signing;
pub mod stream_state;
pub mod telemetry;
pub mod throttle;
pub mod types;
