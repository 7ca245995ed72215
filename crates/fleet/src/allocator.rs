//! Worker selection for a stream about to start.
//!
//! Reads the latest fast-store sample of every active worker and picks the
//! eligible one with the lowest RAM usage. Best-effort: there is no lock, so
//! two concurrent starts may pick the same worker.

use std::sync::Arc;

use streamfleet_core::allocation::{select_least_loaded, AllocationThresholds, Candidate, LiveLoad};
use streamfleet_core::throttle::LogThrottle;
use streamfleet_db::models::stream::StreamConfig;
use streamfleet_db::models::vps::VpsServer;

use crate::cache::{warn_throttled, TelemetryCache};
use crate::error::AllocationError;
use crate::store::FleetStore;

pub struct StreamAllocator {
    store: Arc<dyn FleetStore>,
    cache: Arc<dyn TelemetryCache>,
    throttle: Arc<LogThrottle>,
    thresholds: AllocationThresholds,
}

impl StreamAllocator {
    pub fn new(
        store: Arc<dyn FleetStore>,
        cache: Arc<dyn TelemetryCache>,
        throttle: Arc<LogThrottle>,
        thresholds: AllocationThresholds,
    ) -> Self {
        Self {
            store,
            cache,
            throttle,
            thresholds,
        }
    }

    /// Choose a worker for `stream`.
    ///
    /// A worker whose fast-store entry is missing, unreadable or malformed
    /// is treated as having no telemetry and excluded, as is one whose last
    /// reading is older than the staleness window.
    pub async fn find_optimal_vps(&self, stream: &StreamConfig) -> Result<VpsServer, AllocationError> {
        let workers = self.store.list_active_vps().await?;
        if workers.is_empty() {
            tracing::warn!(stream_id = stream.id, "No active VPS servers for allocation");
            return Err(AllocationError::NoActiveWorkers);
        }

        let mut candidates = Vec::with_capacity(workers.len());
        for vps in &workers {
            let load = match self.cache.worker_sample(vps.id).await {
                Ok(sample) => sample.map(|s| LiveLoad {
                    cpu_usage: s.cpu_usage,
                    ram_usage: s.ram_usage,
                    reported_at: s.timestamp,
                }),
                Err(e) => {
                    warn_throttled(&self.throttle, "allocation.latest_stats", &e);
                    None
                }
            };
            candidates.push(Candidate {
                worker_id: vps.id,
                name: vps.name.clone(),
                load,
            });
        }

        let now = chrono::Utc::now().timestamp();
        let selection = select_least_loaded(&candidates, &self.thresholds, now);
        let chosen = selection
            .chosen
            .and_then(|id| workers.into_iter().find(|vps| vps.id == id));

        match chosen {
            Some(vps) => {
                tracing::info!(
                    stream_id = stream.id,
                    worker_id = vps.id,
                    worker_name = %vps.name,
                    skipped = selection.rejected.len(),
                    "Allocated worker for stream",
                );
                Ok(vps)
            }
            None => {
                for rejected in &selection.rejected {
                    tracing::warn!(
                        stream_id = stream.id,
                        worker_id = rejected.worker_id,
                        worker_name = %rejected.name,
                        rejection = ?rejected.rejection,
                        "Worker not eligible for allocation",
                    );
                }
                tracing::error!(
                    stream_id = stream.id,
                    rejected = selection.rejected.len(),
                    "No healthy VPS server available",
                );
                Err(AllocationError::NoHealthyWorker {
                    rejected: selection.rejected,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
