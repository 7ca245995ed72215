//! Telemetry payload validation and normalization.
//!
//! Workers push a JSON document every few seconds. Everything except the
//! worker id and the three usage percentages is optional, and nothing in the
//! payload is trusted: percentages are clamped and malformed per-stream
//! entries are dropped instead of failing the whole push.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Raw payload as pushed by the worker agent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TelemetryPayload {
    pub worker_id: Option<DbId>,
    pub cpu_usage: Option<f64>,
    pub ram_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub total_streams: Option<i32>,
    /// Unix seconds. Server time is used when absent.
    pub timestamp: Option<i64>,
    /// Keyed by stream id; JSON object keys are always strings.
    #[serde(default)]
    pub active_streams: HashMap<String, ActiveStreamReport>,
}

/// Per-stream state reported by the worker agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ActiveStreamReport {
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    /// Seconds since the stream process started.
    pub uptime: Option<i64>,
    pub error: Option<String>,
}

/// A validated, clamped sample ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSample {
    pub worker_id: DbId,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_usage: f64,
    pub total_streams: Option<i32>,
    pub recorded_at: Timestamp,
    pub streams: Vec<(DbId, ActiveStreamReport)>,
}

/// Clamp a percentage into `0.0..=100.0`. NaN becomes 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Validate required fields and normalize the rest.
///
/// Returns `CoreError::Validation` naming the first missing field. Stream
/// entries whose key is not a positive integer are skipped. A negative
/// `total_streams` is treated as absent.
pub fn normalize(payload: &TelemetryPayload, now: Timestamp) -> Result<NormalizedSample, CoreError> {
    let worker_id = payload
        .worker_id
        .ok_or_else(|| CoreError::Validation("worker_id is required".to_string()))?;
    let cpu = payload
        .cpu_usage
        .ok_or_else(|| CoreError::Validation("cpu_usage is required".to_string()))?;
    let ram = payload
        .ram_usage
        .ok_or_else(|| CoreError::Validation("ram_usage is required".to_string()))?;
    let disk = payload
        .disk_usage
        .ok_or_else(|| CoreError::Validation("disk_usage is required".to_string()))?;

    let recorded_at = payload
        .timestamp
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or(now);

    let mut streams: Vec<(DbId, ActiveStreamReport)> = payload
        .active_streams
        .iter()
        .filter_map(|(key, report)| {
            let id = key.trim().parse::<DbId>().ok().filter(|id| *id > 0)?;
            let mut report = report.clone();
            report.progress = report.progress.map(clamp_percent);
            Some((id, report))
        })
        .collect();
    streams.sort_by_key(|(id, _)| *id);

    Ok(NormalizedSample {
        worker_id,
        cpu_usage: clamp_percent(cpu),
        ram_usage: clamp_percent(ram),
        disk_usage: clamp_percent(disk),
        total_streams: payload.total_streams.filter(|n| *n >= 0),
        recorded_at,
        streams,
    })
}

/// Latest sample as mirrored into the fast store for allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSample {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_usage: f64,
    pub total_streams: Option<i32>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl From<&NormalizedSample> for CachedSample {
    fn from(sample: &NormalizedSample) -> Self {
        Self {
            cpu_usage: sample.cpu_usage,
            ram_usage: sample.ram_usage,
            disk_usage: sample.disk_usage,
            total_streams: sample.total_streams,
            timestamp: sample.recorded_at.timestamp(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TelemetryPayload {
        TelemetryPayload {
            worker_id: Some(3),
            cpu_usage: Some(42.0),
            ram_usage: Some(55.5),
            disk_usage: Some(12.0),
            ..Default::default()
        }
    }

    #[test]
    fn clamps_out_of_range_percentages() {
        assert_eq!(clamp_percent(150.0), 100.0);
        assert_eq!(clamp_percent(-5.0), 0.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(37.5), 37.5);
    }

    #[test]
    fn normalize_clamps_every_metric() {
        let mut p = payload();
        p.cpu_usage = Some(150.0);
        p.ram_usage = Some(-5.0);
        p.disk_usage = Some(100.1);
        let sample = normalize(&p, Utc::now()).unwrap();
        assert_eq!(sample.cpu_usage, 100.0);
        assert_eq!(sample.ram_usage, 0.0);
        assert_eq!(sample.disk_usage, 100.0);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut p = payload();
        p.disk_usage = None;
        let err = normalize(&p, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("disk_usage"));

        let mut p = payload();
        p.worker_id = None;
        assert!(normalize(&p, Utc::now()).is_err());
    }

    #[test]
    fn uses_payload_timestamp_when_present() {
        let mut p = payload();
        p.timestamp = Some(1_700_000_000);
        let sample = normalize(&p, Utc::now()).unwrap();
        assert_eq!(sample.recorded_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn falls_back_to_server_time() {
        let now = Utc::now();
        let sample = normalize(&payload(), now).unwrap();
        assert_eq!(sample.recorded_at, now);
    }

    #[test]
    fn skips_stream_entries_with_bad_keys() {
        let json = r#"{
            "worker_id": 3, "cpu_usage": 1, "ram_usage": 2, "disk_usage": 3,
            "active_streams": {
                "12": {"status": "streaming", "progress": 140},
                "abc": {"status": "streaming"},
                "-4": {"status": "streaming"}
            }
        }"#;
        let p: TelemetryPayload = serde_json::from_str(json).unwrap();
        let sample = normalize(&p, Utc::now()).unwrap();
        assert_eq!(sample.streams.len(), 1);
        assert_eq!(sample.streams[0].0, 12);
        assert_eq!(sample.streams[0].1.progress, Some(100.0));
    }

    #[test]
    fn negative_total_streams_is_ignored() {
        let mut p = payload();
        p.total_streams = Some(-1);
        assert_eq!(normalize(&p, Utc::now()).unwrap().total_streams, None);
    }
}
