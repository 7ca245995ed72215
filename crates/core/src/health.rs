//! Worker health classification.
//!
//! Pure logic. Health is derived at read time from the most recent telemetry
//! sample; there is no background state machine for workers.

use std::time::Duration;

use serde::Serialize;

use crate::types::Timestamp;

/// A sample older than this is considered stale.
pub const TELEMETRY_STALE_AFTER: Duration = Duration::from_secs(300); // 5 minutes

/// CPU percentage above which a worker is reported as overloaded.
pub const OVERLOAD_CPU_PERCENT: f64 = 90.0;

/// RAM percentage above which a worker is reported as overloaded.
pub const OVERLOAD_RAM_PERCENT: f64 = 95.0;

/// Disk percentage at or above which `is_healthy` fails.
pub const MAX_DISK_PERCENT: f64 = 95.0;

/// Health classification for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No telemetry sample has ever been recorded.
    Unknown,
    /// The latest sample is older than the staleness threshold.
    Offline,
    /// Fresh sample with CPU or RAM above the overload thresholds.
    Overloaded,
    Healthy,
}

/// The fields of a telemetry sample the monitor looks at.
#[derive(Debug, Clone, Copy)]
pub struct SampleReading {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_usage: f64,
    pub recorded_at: Timestamp,
}

/// Threshold set used by the health monitor.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub stale_after: Duration,
    pub overload_cpu: f64,
    pub overload_ram: f64,
    pub max_disk: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            stale_after: TELEMETRY_STALE_AFTER,
            overload_cpu: OVERLOAD_CPU_PERCENT,
            overload_ram: OVERLOAD_RAM_PERCENT,
            max_disk: MAX_DISK_PERCENT,
        }
    }
}

impl HealthThresholds {
    /// Whether a sample recorded at `recorded_at` is stale at `now`.
    pub fn is_stale(&self, recorded_at: Timestamp, now: Timestamp) -> bool {
        let age = now.signed_duration_since(recorded_at);
        match chrono::Duration::from_std(self.stale_after) {
            Ok(limit) => age > limit,
            Err(_) => false,
        }
    }
}

/// Classify a worker from its most recent sample.
///
/// Checks run in order: unknown, offline, CPU overload, RAM overload.
pub fn classify(
    latest: Option<&SampleReading>,
    thresholds: &HealthThresholds,
    now: Timestamp,
) -> HealthStatus {
    let Some(sample) = latest else {
        return HealthStatus::Unknown;
    };
    if thresholds.is_stale(sample.recorded_at, now) {
        return HealthStatus::Offline;
    }
    if sample.cpu_usage > thresholds.overload_cpu {
        return HealthStatus::Overloaded;
    }
    if sample.ram_usage > thresholds.overload_ram {
        return HealthStatus::Overloaded;
    }
    HealthStatus::Healthy
}

/// Strict boolean gate: fresh sample and every metric strictly below its limit.
///
/// Unlike [`classify`], a worker sitting exactly on a threshold fails here,
/// and disk usage is taken into account.
pub fn is_healthy(
    latest: Option<&SampleReading>,
    thresholds: &HealthThresholds,
    now: Timestamp,
) -> bool {
    match latest {
        None => false,
        Some(sample) => {
            !thresholds.is_stale(sample.recorded_at, now)
                && sample.cpu_usage < thresholds.overload_cpu
                && sample.ram_usage < thresholds.overload_ram
                && sample.disk_usage < thresholds.max_disk
        }
    }
}

/// Human-readable reason a worker needs attention, or `None` when healthy.
pub fn attention_reason(
    status: HealthStatus,
    latest: Option<&SampleReading>,
    thresholds: &HealthThresholds,
) -> Option<String> {
    match status {
        HealthStatus::Unknown => Some("No telemetry received".to_string()),
        HealthStatus::Offline => Some("Telemetry is stale".to_string()),
        HealthStatus::Overloaded => latest.map(|s| {
            if s.cpu_usage > thresholds.overload_cpu {
                format!("CPU at {:.1}%", s.cpu_usage)
            } else {
                format!("RAM at {:.1}%", s.ram_usage)
            }
        }),
        HealthStatus::Healthy => latest
            .filter(|s| s.disk_usage >= thresholds.max_disk)
            .map(|s| format!("Disk at {:.1}%", s.disk_usage)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
