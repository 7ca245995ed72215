//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod media_file_repo;
pub mod stream_config_repo;
pub mod stream_progress_repo;
pub mod telemetry_repo;
pub mod vps_repo;

pub use media_file_repo::MediaFileRepo;
pub use stream_config_repo::StreamConfigRepo;
pub use stream_progress_repo::StreamProgressRepo;
pub use telemetry_repo::TelemetryRepo;
pub use vps_repo::VpsRepo;
