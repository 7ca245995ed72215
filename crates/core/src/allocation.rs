//! Worker selection for new streams.
//!
//! Pure logic. The caller reads the latest fast-store sample for every
//! active worker and passes the readings in; this module filters and picks.
//!
//! The exclusion thresholds here are tighter than the health monitor's
//! overload thresholds (80/85 vs 90/95). Fast-store entries never expire, so
//! a reading older than the staleness window counts as no telemetry at all.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::TELEMETRY_STALE_AFTER;
use crate::types::DbId;

/// Default CPU percentage at or above which a worker is not given new streams.
pub const ALLOCATION_MAX_CPU_PERCENT: f64 = 80.0;

/// Default RAM percentage at or above which a worker is not given new streams.
pub const ALLOCATION_MAX_RAM_PERCENT: f64 = 85.0;

#[derive(Debug, Clone, Copy)]
pub struct AllocationThresholds {
    pub max_cpu: f64,
    pub max_ram: f64,
    /// A fast-store reading older than this excludes the worker.
    pub stale_after: Duration,
}

impl Default for AllocationThresholds {
    fn default() -> Self {
        Self {
            max_cpu: ALLOCATION_MAX_CPU_PERCENT,
            max_ram: ALLOCATION_MAX_RAM_PERCENT,
            stale_after: TELEMETRY_STALE_AFTER,
        }
    }
}

/// Latest resource usage as mirrored in the fast store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveLoad {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    /// Unix seconds at which the worker took the reading.
    pub reported_at: i64,
}

/// One active worker and whatever the fast store knows about it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub worker_id: DbId,
    pub name: String,
    /// `None` when the fast store has no (or an unparseable) entry.
    pub load: Option<LiveLoad>,
}

/// Why a candidate was not eligible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    NoTelemetry,
    Stale { age_secs: i64 },
    CpuTooHigh { cpu_usage: f64, ram_usage: f64 },
    RamTooHigh { cpu_usage: f64, ram_usage: f64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedCandidate {
    pub worker_id: DbId,
    pub name: String,
    #[serde(flatten)]
    pub rejection: Rejection,
}

/// Result of a selection pass.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Worker with the lowest RAM usage among eligible candidates.
    pub chosen: Option<DbId>,
    pub rejected: Vec<RejectedCandidate>,
}

/// Check one candidate against the thresholds at unix time `now`.
pub fn check_candidate(
    load: Option<&LiveLoad>,
    thresholds: &AllocationThresholds,
    now: i64,
) -> Result<LiveLoad, Rejection> {
    let Some(load) = load.copied() else {
        return Err(Rejection::NoTelemetry);
    };
    let age_secs = now.saturating_sub(load.reported_at);
    let limit = i64::try_from(thresholds.stale_after.as_secs()).unwrap_or(i64::MAX);
    if age_secs > limit {
        return Err(Rejection::Stale { age_secs });
    }
    if load.cpu_usage >= thresholds.max_cpu {
        return Err(Rejection::CpuTooHigh {
            cpu_usage: load.cpu_usage,
            ram_usage: load.ram_usage,
        });
    }
    if load.ram_usage >= thresholds.max_ram {
        return Err(Rejection::RamTooHigh {
            cpu_usage: load.cpu_usage,
            ram_usage: load.ram_usage,
        });
    }
    Ok(load)
}

/// Greedy least-loaded selection by RAM.
///
/// Ties go to the earlier candidate. Job counts are ignored on purpose: the
/// pushed telemetry is fresher than the per-worker counter.
pub fn select_least_loaded(
    candidates: &[Candidate],
    thresholds: &AllocationThresholds,
    now: i64,
) -> Selection {
    let mut best: Option<(DbId, f64)> = None;
    let mut rejected = Vec::new();

    for candidate in candidates {
        match check_candidate(candidate.load.as_ref(), thresholds, now) {
            Ok(load) => {
                let better = match best {
                    Some((_, best_ram)) => load.ram_usage < best_ram,
                    None => true,
                };
                if better {
                    best = Some((candidate.worker_id, load.ram_usage));
                }
            }
            Err(rejection) => rejected.push(RejectedCandidate {
                worker_id: candidate.worker_id,
                name: candidate.name.clone(),
                rejection,
            }),
        }
    }

    Selection {
        chosen: best.map(|(id, _)| id),
        rejected,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
