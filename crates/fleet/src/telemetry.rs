//! Telemetry ingestion and read paths.
//!
//! Workers push samples over HTTP. A push never fails loudly: validation
//! problems and unknown workers are logged and reported as `false`, and
//! fast-store trouble is logged through the throttle without affecting the
//! durable write.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use streamfleet_core::telemetry::{normalize, CachedSample, NormalizedSample, TelemetryPayload};
use streamfleet_core::throttle::LogThrottle;
use streamfleet_core::types::DbId;
use streamfleet_db::models::telemetry::{
    CreateTelemetrySample, SampleAggregate, TelemetrySample, UpsertStreamProgress,
};

use crate::cache::{warn_throttled, TelemetryCache};
use crate::error::FleetError;
use crate::store::FleetStore;

/// Largest window accepted by [`VpsStatsCollector::worker_stats`].
pub const MAX_STATS_HOURS: i64 = 168;

/// Aggregates plus a bounded history slice for one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker_id: DbId,
    pub hours: i64,
    #[serde(flatten)]
    pub aggregate: SampleAggregate,
    /// Newest first.
    pub history: Vec<TelemetrySample>,
}

pub struct VpsStatsCollector {
    store: Arc<dyn FleetStore>,
    cache: Arc<dyn TelemetryCache>,
    throttle: Arc<LogThrottle>,
    history_limit: i64,
}

impl VpsStatsCollector {
    pub fn new(
        store: Arc<dyn FleetStore>,
        cache: Arc<dyn TelemetryCache>,
        throttle: Arc<LogThrottle>,
        history_limit: i64,
    ) -> Self {
        Self {
            store,
            cache,
            throttle,
            history_limit,
        }
    }

    /// Validate, persist and mirror one pushed sample.
    ///
    /// Returns `false` when the payload is invalid, the worker is unknown or
    /// the durable write fails.
    pub async fn store_sample(&self, payload: &TelemetryPayload) -> bool {
        let now = Utc::now();
        let sample = match normalize(payload, now) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(worker_id = ?payload.worker_id, error = %e, "Rejected telemetry payload");
                return false;
            }
        };

        match self.store.get_vps(sample.worker_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(worker_id = sample.worker_id, "Telemetry from unknown worker");
                return false;
            }
            Err(e) => {
                tracing::error!(worker_id = sample.worker_id, error = %e, "Worker lookup failed");
                return false;
            }
        }

        if let Err(e) = self.persist(&sample, now).await {
            tracing::error!(worker_id = sample.worker_id, error = %e, "Failed to store telemetry");
            return false;
        }

        self.mirror(&sample).await;

        tracing::debug!(
            worker_id = sample.worker_id,
            cpu = sample.cpu_usage,
            ram = sample.ram_usage,
            disk = sample.disk_usage,
            streams = sample.streams.len(),
            "Telemetry stored",
        );
        true
    }

    async fn persist(
        &self,
        sample: &NormalizedSample,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), FleetError> {
        self.store
            .insert_sample(&CreateTelemetrySample {
                vps_server_id: sample.worker_id,
                cpu_usage: sample.cpu_usage,
                ram_usage: sample.ram_usage,
                disk_usage: sample.disk_usage,
                recorded_at: sample.recorded_at,
            })
            .await?;

        self.store
            .record_self_report(sample.worker_id, sample.total_streams, now)
            .await?;

        for (stream_id, report) in &sample.streams {
            let progress = UpsertStreamProgress {
                stream_config_id: *stream_id,
                vps_server_id: sample.worker_id,
                status: report.status.clone(),
                progress: report.progress,
                message: report.message.clone(),
                uptime_secs: report.uptime,
                error: report.error.clone(),
            };
            // A report for a stream that no longer exists must not sink the push.
            if let Err(e) = self.store.upsert_progress(&progress, now).await {
                tracing::warn!(
                    worker_id = sample.worker_id,
                    stream_id,
                    error = %e,
                    "Failed to store stream progress",
                );
            }
        }
        Ok(())
    }

    async fn mirror(&self, sample: &NormalizedSample) {
        if let Err(e) = self
            .cache
            .put_worker_sample(sample.worker_id, &CachedSample::from(sample))
            .await
        {
            warn_throttled(&self.throttle, "telemetry.latest_stats", &e);
        }
        for (stream_id, report) in &sample.streams {
            if let Err(e) = self.cache.put_live_status(*stream_id, report).await {
                warn_throttled(&self.throttle, "telemetry.live_status", &e);
            }
        }
    }

    /// Averages, peaks and recent history for the last `hours` (clamped to
    /// `1..=168`). `None` when the worker does not exist.
    pub async fn worker_stats(
        &self,
        worker_id: DbId,
        hours: i64,
    ) -> Result<Option<WorkerStats>, FleetError> {
        if self.store.get_vps(worker_id).await?.is_none() {
            return Ok(None);
        }
        let hours = hours.clamp(1, MAX_STATS_HOURS);
        let since = Utc::now() - Duration::hours(hours);
        let aggregate = self.store.aggregate_samples(worker_id, since).await?;
        let history = self
            .store
            .recent_samples(worker_id, since, self.history_limit)
            .await?;
        Ok(Some(WorkerStats {
            worker_id,
            hours,
            aggregate,
            history,
        }))
    }

    /// Latest sample per worker among samples from the last hour.
    pub async fn fleet_snapshot(&self) -> Result<Vec<TelemetrySample>, FleetError> {
        self.store
            .latest_samples_since(Utc::now() - Duration::hours(1))
            .await
    }

    /// Delete samples older than `days`. Returns the number removed.
    pub async fn prune(&self, days: i64) -> Result<u64, FleetError> {
        let cutoff = Utc::now() - Duration::days(days.max(0));
        let deleted = self.store.delete_samples_older_than(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, days, "Pruned old telemetry samples");
        }
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::cache::LATEST_STATS_KEY;
    use crate::testing::{stream, vps, InMemoryCache, InMemoryStore};
    use streamfleet_core::stream_state::StreamStatus;
    use streamfleet_core::telemetry::ActiveStreamReport;

    struct Harness {
        store: Arc<InMemoryStore>,
        cache: Arc<InMemoryCache>,
        throttle: Arc<LogThrottle>,
        collector: VpsStatsCollector,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(InMemoryCache::default());
        let throttle = Arc::new(LogThrottle::default());
        store.insert_vps(vps(1, "edge-1"));
        let collector = VpsStatsCollector::new(store.clone(), cache.clone(), throttle.clone(), 60);
        Harness {
            store,
            cache,
            throttle,
            collector,
        }
    }

    fn payload(worker_id: DbId, cpu: f64, ram: f64, disk: f64) -> TelemetryPayload {
        TelemetryPayload {
            worker_id: Some(worker_id),
            cpu_usage: Some(cpu),
            ram_usage: Some(ram),
            disk_usage: Some(disk),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // store_sample
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn out_of_range_percentages_are_clamped() {
        let h = harness();
        assert!(h.collector.store_sample(&payload(1, 150.0, -5.0, 50.0)).await);

        let rows = h.store.samples_for(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cpu_usage, 100.0);
        assert_eq!(rows[0].ram_usage, 0.0);

        let cached = h.cache.worker_sample(1).await.unwrap().unwrap();
        assert_eq!(cached.cpu_usage, 100.0);
        assert_eq!(cached.ram_usage, 0.0);
    }

    #[tokio::test]
    async fn unknown_worker_is_rejected_without_side_effects() {
        let h = harness();
        assert!(!h.collector.store_sample(&payload(42, 10.0, 10.0, 10.0)).await);
        assert!(h.store.samples_for(42).is_empty());
        assert!(h.cache.raw(LATEST_STATS_KEY, "42").is_none());
    }

    #[tokio::test]
    async fn missing_required_field_is_rejected() {
        let h = harness();
        let mut p = payload(1, 10.0, 10.0, 10.0);
        p.disk_usage = None;
        assert!(!h.collector.store_sample(&p).await);
        assert!(h.store.samples_for(1).is_empty());
    }

    #[tokio::test]
    async fn self_report_updates_counter_and_last_seen() {
        let h = harness();
        let mut p = payload(1, 10.0, 20.0, 30.0);
        p.total_streams = Some(3);
        assert!(h.collector.store_sample(&p).await);

        let worker = h.store.vps_row(1).unwrap();
        assert_eq!(worker.current_streams, 3);
        assert!(worker.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn absent_total_streams_keeps_counter() {
        let h = harness();
        let mut worker = vps(2, "edge-2");
        worker.current_streams = 4;
        h.store.insert_vps(worker);

        assert!(h.collector.store_sample(&payload(2, 10.0, 20.0, 30.0)).await);
        let worker = h.store.vps_row(2).unwrap();
        assert_eq!(worker.current_streams, 4);
        assert!(worker.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn active_streams_are_upserted_and_mirrored() {
        let h = harness();
        h.store.insert_stream(stream(7, StreamStatus::Streaming));
        let mut p = payload(1, 10.0, 20.0, 30.0);
        p.active_streams = HashMap::from([
            (
                "7".to_string(),
                ActiveStreamReport {
                    status: Some("streaming".into()),
                    progress: Some(140.0),
                    uptime: Some(30),
                    ..Default::default()
                },
            ),
            ("garbage".to_string(), ActiveStreamReport::default()),
        ]);
        assert!(h.collector.store_sample(&p).await);

        let row = h.store.progress_row(7).unwrap();
        assert_eq!(row.vps_server_id, Some(1));
        assert_eq!(row.progress, Some(100.0));
        assert_eq!(row.uptime_secs, Some(30));

        let live = h.cache.live_status(7).await.unwrap().unwrap();
        assert_eq!(live.status.as_deref(), Some("streaming"));
    }

    #[tokio::test]
    async fn fast_store_outage_does_not_fail_ingestion() {
        let h = harness();
        h.cache.set_unavailable(true);

        assert!(h.collector.store_sample(&payload(1, 10.0, 20.0, 30.0)).await);
        assert!(h.collector.store_sample(&payload(1, 11.0, 21.0, 31.0)).await);

        assert_eq!(h.store.samples_for(1).len(), 2);
        // The repeated connection error is only remembered once.
        assert_eq!(h.throttle.tracked(), 1);
    }

    #[tokio::test]
    async fn store_outage_returns_false() {
        let h = harness();
        h.store.set_unavailable(true);
        assert!(!h.collector.store_sample(&payload(1, 10.0, 20.0, 30.0)).await);
    }

    // -----------------------------------------------------------------------
    // Read paths
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn worker_stats_aggregates_window() {
        let h = harness();
        let now = Utc::now();
        h.store.insert_raw_sample(1, 10.0, 40.0, 50.0, now - Duration::minutes(10));
        h.store.insert_raw_sample(1, 30.0, 60.0, 50.0, now - Duration::minutes(5));
        h.store.insert_raw_sample(1, 99.0, 99.0, 99.0, now - Duration::hours(3));

        let stats = h.collector.worker_stats(1, 1).await.unwrap().unwrap();
        assert_eq!(stats.aggregate.sample_count, 2);
        assert_eq!(stats.aggregate.avg_cpu, Some(20.0));
        assert_eq!(stats.aggregate.peak_ram, Some(60.0));
        assert_eq!(stats.history.len(), 2);
        assert!(stats.history[0].recorded_at > stats.history[1].recorded_at);
    }

    #[tokio::test]
    async fn worker_stats_clamps_hours_and_handles_unknown_worker() {
        let h = harness();
        let stats = h.collector.worker_stats(1, 10_000).await.unwrap().unwrap();
        assert_eq!(stats.hours, MAX_STATS_HOURS);
        assert!(h.collector.worker_stats(99, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_only_includes_last_hour() {
        let h = harness();
        h.store.insert_vps(vps(2, "edge-2"));
        let now = Utc::now();
        h.store.insert_raw_sample(1, 10.0, 10.0, 10.0, now - Duration::minutes(2));
        h.store.insert_raw_sample(1, 20.0, 20.0, 20.0, now - Duration::minutes(1));
        h.store.insert_raw_sample(2, 30.0, 30.0, 30.0, now - Duration::hours(2));

        let snapshot = h.collector.fleet_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].vps_server_id, 1);
        assert_eq!(snapshot[0].cpu_usage, 20.0);
    }

    #[tokio::test]
    async fn prune_removes_old_samples() {
        let h = harness();
        let now = Utc::now();
        h.store.insert_raw_sample(1, 10.0, 10.0, 10.0, now - Duration::days(8));
        h.store.insert_raw_sample(1, 10.0, 10.0, 10.0, now - Duration::days(1));

        assert_eq!(h.collector.prune(7).await.unwrap(), 1);
        assert_eq!(h.store.samples_for(1).len(), 1);
    }
}
