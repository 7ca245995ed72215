//! Periodic repair of drift between the database, the fast store and the
//! workers.
//!
//! Every pass is idempotent. Per-stream failures are logged and the pass
//! moves on; only a failure to list candidates aborts it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use streamfleet_core::agent::stop_command;
use streamfleet_core::counters::{plan_resync, RecordedCounter, ResyncPlan};
use streamfleet_core::stream_state::{StreamEvent, StreamStatus};
use streamfleet_core::throttle::LogThrottle;
use streamfleet_core::types::{DbId, Timestamp};

use crate::cache::{warn_throttled, TelemetryCache};
use crate::config::FleetConfig;
use crate::connection::RemoteShell;
use crate::error::{FleetError, StreamError};
use crate::manager::StreamManager;
use crate::store::FleetStore;

/// Result of [`Reconciler::stop_stream_gracefully`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// The worker confirmed the stop.
    Stopped,
    /// The stop path failed; the stream was marked stopped regardless.
    Forced { reason: String },
    AlreadyInactive,
}

/// A progress report for a stream nobody should be running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZombieStream {
    pub stream_id: DbId,
    pub worker_id: Option<DbId>,
    /// Whether the reporting worker acknowledged the stop command.
    pub stop_sent: bool,
}

pub struct Reconciler {
    store: Arc<dyn FleetStore>,
    cache: Arc<dyn TelemetryCache>,
    shell: Arc<dyn RemoteShell>,
    manager: Arc<StreamManager>,
    throttle: Arc<LogThrottle>,
    agent_port: u16,
    stopping_timeout: Duration,
    starting_timeout: Duration,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn FleetStore>,
        cache: Arc<dyn TelemetryCache>,
        shell: Arc<dyn RemoteShell>,
        manager: Arc<StreamManager>,
        throttle: Arc<LogThrottle>,
        config: &FleetConfig,
    ) -> Self {
        Self {
            store,
            cache,
            shell,
            manager,
            throttle,
            agent_port: config.agent_port,
            stopping_timeout: config.stopping_timeout,
            starting_timeout: config.starting_timeout,
            stale_after: config.health.stale_after,
        }
    }

    // -----------------------------------------------------------------------
    // Hardened stop
    // -----------------------------------------------------------------------

    /// Stop a stream and make sure it ends INACTIVE whatever the worker says.
    ///
    /// Lifecycle violations other than "already inactive" are still
    /// returned as errors; everything after the stream entered STOPPING is
    /// absorbed into [`StopOutcome::Forced`]. The worker counter is only
    /// given back for a stream that was running before the stop.
    pub async fn stop_stream_gracefully(&self, stream_id: DbId) -> Result<StopOutcome, StreamError> {
        let stream = self
            .store
            .get_stream(stream_id)
            .await?
            .ok_or(StreamError::NotFound(stream_id))?;
        let current = stream.status()?;
        if current == StreamStatus::Inactive {
            return Ok(StopOutcome::AlreadyInactive);
        }
        current.apply(StreamEvent::BeginStop)?;

        if current != StreamStatus::Stopping {
            self.store.mark_stopping(stream_id, current).await?;
        }

        let err = match self.manager.stop_loaded(&stream, current).await {
            Ok(()) => return Ok(StopOutcome::Stopped),
            Err(e) => e,
        };

        let reason = err.to_string();
        tracing::warn!(
            stream_id,
            worker_id = ?stream.vps_server_id,
            error = %reason,
            "Stop failed, forcing stream to inactive",
        );
        StreamStatus::Stopping.apply(StreamEvent::ForceStop)?;

        let message = format!("Stop command failed: {reason}. Stream marked as stopped anyway.");
        self.store
            .mark_stopped(stream_id, Utc::now(), Some(&message))
            .await?;
        if let Some(worker_id) = stream.vps_server_id {
            if current.holds_worker_slot() {
                self.store.decrement_streams(worker_id).await?;
            }
        }
        self.forget_progress(stream_id).await;

        Ok(StopOutcome::Forced { reason })
    }

    /// Drop durable and live progress of a stream, best-effort.
    async fn forget_progress(&self, stream_id: DbId) {
        if let Err(e) = self.store.delete_progress(stream_id).await {
            tracing::warn!(stream_id, error = %e, "Failed to clear stream progress");
        }
        if let Err(e) = self.cache.clear_live_status(stream_id).await {
            warn_throttled(&self.throttle, "reconcile.live_status", &e);
        }
    }

    // -----------------------------------------------------------------------
    // Stuck-state sweeps
    // -----------------------------------------------------------------------

    /// Force streams stuck in STOPPING past the timeout to INACTIVE.
    pub async fn sweep_stuck_stopping(&self, now: Timestamp) -> Result<usize, FleetError> {
        let stuck = self
            .store
            .list_stuck_streams(StreamStatus::Stopping, cutoff(now, self.stopping_timeout))
            .await?;

        let mut fixed = 0;
        for stream in stuck {
            match self.release_stuck_stopping(stream.id, stream.vps_server_id, now).await {
                Ok(()) => {
                    fixed += 1;
                    tracing::warn!(
                        stream_id = stream.id,
                        worker_id = ?stream.vps_server_id,
                        "Stream stuck in stopping, forced to inactive",
                    );
                }
                Err(e) => {
                    tracing::error!(stream_id = stream.id, error = %e, "Failed to release stuck stream");
                }
            }
        }
        Ok(fixed)
    }

    async fn release_stuck_stopping(
        &self,
        stream_id: DbId,
        worker_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<(), FleetError> {
        self.store.mark_stopped(stream_id, now, None).await?;
        let Some(worker_id) = worker_id else {
            return Ok(());
        };
        if let Some(vps) = self.store.get_vps(worker_id).await? {
            if vps.current_streams > 0 {
                self.store.decrement_streams(worker_id).await?;
            }
        }
        Ok(())
    }

    /// Move streams stuck in STARTING past the timeout to ERROR.
    ///
    /// The worker counter was never incremented for them and stays as is.
    pub async fn sweep_stuck_starting(&self, now: Timestamp) -> Result<usize, FleetError> {
        let stuck = self
            .store
            .list_stuck_streams(StreamStatus::Starting, cutoff(now, self.starting_timeout))
            .await?;

        let mut fixed = 0;
        for stream in stuck {
            match self
                .store
                .mark_error(stream.id, StreamStatus::Starting, "Start timed out")
                .await
            {
                Ok(_) => {
                    fixed += 1;
                    tracing::warn!(
                        stream_id = stream.id,
                        worker_id = ?stream.vps_server_id,
                        "Stream stuck in starting, marked as error",
                    );
                }
                Err(e) => {
                    tracing::error!(stream_id = stream.id, error = %e, "Failed to mark stuck stream");
                }
            }
        }
        Ok(fixed)
    }

    // -----------------------------------------------------------------------
    // Counter resync
    // -----------------------------------------------------------------------

    /// Recompute worker stream counters from STREAMING rows.
    pub async fn sync_stream_counters(&self) -> Result<ResyncPlan, FleetError> {
        let workers = self.store.list_vps().await?;
        let actual = self.store.count_streaming_by_vps().await?;
        let recorded: Vec<RecordedCounter> = workers.iter().map(|w| w.recorded_counter()).collect();
        let plan = plan_resync(&recorded, &actual);

        if plan.is_clean() {
            tracing::debug!(workers = workers.len(), "Stream counters in sync");
            return Ok(plan);
        }

        if plan.critical {
            tracing::error!(
                drifted = plan.drifts.len(),
                "Critical stream counter drift, running full resync",
            );
            let updated = self.store.reset_all_streams().await?;
            tracing::info!(updated, "Full stream counter resync complete");
            return Ok(plan);
        }

        for drift in &plan.drifts {
            tracing::warn!(
                worker_id = drift.worker_id,
                recorded = drift.recorded,
                actual = drift.actual,
                "Stream counter drift corrected",
            );
            self.store.set_streams(drift.worker_id, drift.actual).await?;
        }
        Ok(plan)
    }

    // -----------------------------------------------------------------------
    // Zombie detection
    // -----------------------------------------------------------------------

    /// Find fresh progress reports for streams the database does not
    /// consider running, ask the reporting worker to stop them and clear
    /// the report.
    pub async fn detect_zombie_streams(&self, now: Timestamp) -> Result<Vec<ZombieStream>, FleetError> {
        let reports = self
            .store
            .list_progress_since(cutoff(now, self.stale_after))
            .await?;

        if reports.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DbId> = reports.iter().map(|r| r.stream_config_id).collect();
        let running: HashSet<DbId> = self
            .store
            .list_streams_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|s| s.status().map_or(false, StreamStatus::expects_remote_process))
            .map(|s| s.id)
            .collect();

        let mut zombies = Vec::new();
        for report in reports {
            let stream_id = report.stream_config_id;
            if running.contains(&stream_id) {
                continue;
            }

            let stop_sent = match report.vps_server_id {
                Some(worker_id) => match self.send_stop(worker_id, stream_id).await {
                    Ok(sent) => sent,
                    Err(e) => {
                        tracing::error!(
                            stream_id,
                            worker_id,
                            error = %e,
                            "Failed to look up worker of zombie stream",
                        );
                        continue;
                    }
                },
                None => false,
            };
            tracing::warn!(
                stream_id,
                worker_id = ?report.vps_server_id,
                stop_sent,
                "Zombie stream detected",
            );
            self.forget_progress(stream_id).await;

            zombies.push(ZombieStream {
                stream_id,
                worker_id: report.vps_server_id,
                stop_sent,
            });
        }
        Ok(zombies)
    }

    async fn send_stop(&self, worker_id: DbId, stream_id: DbId) -> Result<bool, FleetError> {
        let Some(vps) = self.store.get_vps(worker_id).await? else {
            return Ok(false);
        };
        let outcome = self
            .shell
            .execute(&vps, &stop_command(self.agent_port, stream_id))
            .await;
        if !outcome.success {
            tracing::debug!(
                stream_id,
                worker_id,
                error = %outcome.failure_reason(),
                "Zombie stop command failed",
            );
        }
        Ok(outcome.success)
    }
}

/// `now - window`, saturating at the earliest representable time.
fn cutoff(now: Timestamp, window: Duration) -> Timestamp {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
