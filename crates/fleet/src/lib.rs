//! Fleet services: telemetry ingestion, health monitoring, allocation,
//! stream lifecycle and reconciliation.
//!
//! Every I/O boundary sits behind a trait so the services can be driven by
//! in-memory doubles in tests:
//!
//! - [`store::FleetStore`] (PostgreSQL via `streamfleet-db`)
//! - [`cache::TelemetryCache`] (Redis hashes)
//! - [`connection::RemoteShell`] (ssh/scp subprocesses)
//! - [`media::MediaResolver`] (CDN or signed download links)

pub mod allocator;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod media;
pub mod monitor;
pub mod reconcile;
pub mod store;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
