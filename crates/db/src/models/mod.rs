//! Entity models and DTOs, one module per table group.

pub mod media;
pub mod status;
pub mod stream;
pub mod telemetry;
pub mod vps;
