//! Worker stream-counter drift detection.
//!
//! `vps_servers.current_streams` is bumped up and down from several call
//! sites without locking, so it drifts. The counter is a cache; the number
//! of STREAMING rows pointing at the worker is the truth. This module
//! compares the two and decides how to repair.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::DbId;

/// A drift of this many streams on a single worker triggers a full resync.
pub const CRITICAL_DRIFT: i64 = 3;

/// Counter state of one worker as stored.
#[derive(Debug, Clone, Copy)]
pub struct RecordedCounter {
    pub worker_id: DbId,
    pub current_streams: i32,
    pub max_streams: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub worker_id: DbId,
    pub recorded: i32,
    pub actual: i32,
}

impl CounterDrift {
    pub fn delta(&self) -> i64 {
        i64::from(self.recorded) - i64::from(self.actual)
    }
}

/// What the resync pass should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResyncPlan {
    pub drifts: Vec<CounterDrift>,
    /// When set, every counter is rewritten instead of patching `drifts`.
    pub critical: bool,
}

impl ResyncPlan {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Compare recorded counters with the actual STREAMING counts.
///
/// Workers absent from `actual` have zero running streams. Drift is critical
/// when a counter is negative, exceeds the declared capacity, or is off by
/// at least [`CRITICAL_DRIFT`].
pub fn plan_resync(recorded: &[RecordedCounter], actual: &HashMap<DbId, i64>) -> ResyncPlan {
    let mut drifts = Vec::new();
    let mut critical = false;

    for counter in recorded {
        let truth = actual.get(&counter.worker_id).copied().unwrap_or(0);
        let truth = i32::try_from(truth).unwrap_or(i32::MAX);
        if counter.current_streams == truth {
            continue;
        }
        let drift = CounterDrift {
            worker_id: counter.worker_id,
            recorded: counter.current_streams,
            actual: truth,
        };
        if counter.current_streams < 0
            || counter.current_streams > counter.max_streams
            || drift.delta().abs() >= CRITICAL_DRIFT
        {
            critical = true;
        }
        drifts.push(drift);
    }

    ResyncPlan { drifts, critical }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(id: DbId, current: i32, max: i32) -> RecordedCounter {
        RecordedCounter {
            worker_id: id,
            current_streams: current,
            max_streams: max,
        }
    }

    #[test]
    fn matching_counters_are_clean() {
        let actual = HashMap::from([(1, 2)]);
        let plan = plan_resync(&[counter(1, 2, 5), counter(2, 0, 5)], &actual);
        assert!(plan.is_clean());
        assert!(!plan.critical);
    }

    #[test]
    fn small_drift_is_patched_incrementally() {
        let actual = HashMap::from([(1, 1)]);
        let plan = plan_resync(&[counter(1, 2, 5)], &actual);
        assert_eq!(
            plan.drifts,
            vec![CounterDrift {
                worker_id: 1,
                recorded: 2,
                actual: 1
            }]
        );
        assert!(!plan.critical);
    }

    #[test]
    fn large_drift_is_critical() {
        let plan = plan_resync(&[counter(1, 3, 5)], &HashMap::new());
        assert!(plan.critical);
        assert_eq!(plan.drifts[0].delta(), 3);
    }

    #[test]
    fn negative_counter_is_critical() {
        let plan = plan_resync(&[counter(1, -1, 5)], &HashMap::new());
        assert!(plan.critical);
    }

    #[test]
    fn over_capacity_counter_is_critical() {
        let actual = HashMap::from([(1, 2)]);
        let plan = plan_resync(&[counter(1, 3, 2)], &actual);
        assert!(plan.critical);
    }
}
