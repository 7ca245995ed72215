//! Telemetry models: append-only samples and per-stream progress.

use serde::Serialize;
use sqlx::FromRow;
use streamfleet_core::health::SampleReading;
use streamfleet_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Samples (append-only)
// ---------------------------------------------------------------------------

/// A row from the `vps_telemetry` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TelemetrySample {
    pub id: DbId,
    pub vps_server_id: DbId,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_usage: f64,
    pub recorded_at: Timestamp,
    pub created_at: Timestamp,
}

impl TelemetrySample {
    pub fn reading(&self) -> SampleReading {
        SampleReading {
            cpu_usage: self.cpu_usage,
            ram_usage: self.ram_usage,
            disk_usage: self.disk_usage,
            recorded_at: self.recorded_at,
        }
    }
}

/// DTO for inserting a sample. Values are already clamped.
#[derive(Debug, Clone)]
pub struct CreateTelemetrySample {
    pub vps_server_id: DbId,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_usage: f64,
    pub recorded_at: Timestamp,
}

/// Aggregate over a worker's samples in a time window.
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct SampleAggregate {
    pub sample_count: i64,
    pub avg_cpu: Option<f64>,
    pub avg_ram: Option<f64>,
    pub avg_disk: Option<f64>,
    pub peak_cpu: Option<f64>,
    pub peak_ram: Option<f64>,
    pub peak_disk: Option<f64>,
}

// ---------------------------------------------------------------------------
// Stream progress (overwritten on every push)
// ---------------------------------------------------------------------------

/// A row from the `stream_progress` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StreamProgress {
    pub stream_config_id: DbId,
    pub vps_server_id: Option<DbId>,
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub uptime_secs: Option<i64>,
    pub error: Option<String>,
    pub updated_at: Timestamp,
}

/// DTO for upserting a progress row.
#[derive(Debug, Clone)]
pub struct UpsertStreamProgress {
    pub stream_config_id: DbId,
    pub vps_server_id: DbId,
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub uptime_secs: Option<i64>,
    pub error: Option<String>,
}
