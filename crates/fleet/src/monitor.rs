//! Fleet health monitor.
//!
//! Health is evaluated on read from the latest durable telemetry sample of
//! each worker. Nothing is cached between calls.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use streamfleet_core::health::{
    attention_reason, classify, is_healthy, HealthStatus, HealthThresholds, SampleReading,
};
use streamfleet_core::types::{DbId, Timestamp};
use streamfleet_db::models::vps::VpsServer;

use crate::error::FleetError;
use crate::store::FleetStore;

/// Health of one worker at evaluation time.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub worker_id: DbId,
    pub name: String,
    pub status: HealthStatus,
    /// Passes the strict gate (fresh, CPU/RAM/disk strictly below limits).
    pub healthy: bool,
    pub cpu_usage: Option<f64>,
    pub ram_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub last_sample_at: Option<Timestamp>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub healthy: usize,
    pub offline: usize,
    pub overloaded: usize,
    pub unknown: usize,
    /// Workers that pushed telemetry within the staleness window.
    pub reporting_recently: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerCapacity {
    pub worker_id: DbId,
    pub name: String,
    pub current_streams: i32,
    pub max_streams: i32,
    pub available: i32,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetCapacity {
    pub workers: Vec<WorkerCapacity>,
    pub total_current: i64,
    pub total_max: i64,
    pub total_available: i64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttentionItem {
    pub worker_id: DbId,
    pub name: String,
    pub status: HealthStatus,
    pub reason: String,
}

fn utilization(current: i64, max: i64) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    let percent = current as f64 / max as f64 * 100.0;
    (percent * 10.0).round() / 10.0
}

pub struct VpsMonitor {
    store: Arc<dyn FleetStore>,
    thresholds: HealthThresholds,
}

impl VpsMonitor {
    pub fn new(store: Arc<dyn FleetStore>, thresholds: HealthThresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    async fn evaluate(&self, vps: &VpsServer, now: Timestamp) -> Result<WorkerHealth, FleetError> {
        let latest = self
            .store
            .latest_sample(vps.id)
            .await?
            .map(|sample| sample.reading());
        Ok(self.assess(vps, latest.as_ref(), now))
    }

    fn assess(&self, vps: &VpsServer, latest: Option<&SampleReading>, now: Timestamp) -> WorkerHealth {
        let status = classify(latest, &self.thresholds, now);
        WorkerHealth {
            worker_id: vps.id,
            name: vps.name.clone(),
            status,
            healthy: is_healthy(latest, &self.thresholds, now),
            cpu_usage: latest.map(|s| s.cpu_usage),
            ram_usage: latest.map(|s| s.ram_usage),
            disk_usage: latest.map(|s| s.disk_usage),
            last_sample_at: latest.map(|s| s.recorded_at),
            reason: attention_reason(status, latest, &self.thresholds),
        }
    }

    /// Health of one worker, `None` when it does not exist.
    pub async fn health(&self, worker_id: DbId) -> Result<Option<WorkerHealth>, FleetError> {
        let Some(vps) = self.store.get_vps(worker_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.evaluate(&vps, Utc::now()).await?))
    }

    /// Strict gate used before trusting a worker: a sample newer than the
    /// staleness window and CPU, RAM and disk strictly below their limits.
    pub async fn is_healthy(&self, worker_id: DbId) -> Result<bool, FleetError> {
        let latest = self
            .store
            .latest_sample(worker_id)
            .await?
            .map(|sample| sample.reading());
        Ok(is_healthy(latest.as_ref(), &self.thresholds, Utc::now()))
    }

    /// Health of every registered worker.
    pub async fn fleet_health(&self) -> Result<Vec<WorkerHealth>, FleetError> {
        let now = Utc::now();
        let mut out = Vec::new();
        for vps in self.store.list_vps().await? {
            out.push(self.evaluate(&vps, now).await?);
        }
        Ok(out)
    }

    pub async fn fleet_summary(&self) -> Result<FleetSummary, FleetError> {
        let now = Utc::now();
        let mut summary = FleetSummary::default();
        for vps in self.store.list_vps().await? {
            let health = self.evaluate(&vps, now).await?;
            summary.total += 1;
            match health.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Offline => summary.offline += 1,
                HealthStatus::Overloaded => summary.overloaded += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
            if vps
                .last_seen_at
                .is_some_and(|seen| !self.thresholds.is_stale(seen, now))
            {
                summary.reporting_recently += 1;
            }
        }
        Ok(summary)
    }

    /// Stream capacity of every active worker and the fleet total.
    pub async fn capacity(&self) -> Result<FleetCapacity, FleetError> {
        let workers: Vec<WorkerCapacity> = self
            .store
            .list_active_vps()
            .await?
            .into_iter()
            .map(|vps| {
                let current = vps.current_streams.max(0);
                WorkerCapacity {
                    worker_id: vps.id,
                    name: vps.name,
                    current_streams: current,
                    max_streams: vps.max_streams,
                    available: (vps.max_streams - current).max(0),
                    utilization_percent: utilization(current.into(), vps.max_streams.into()),
                }
            })
            .collect();

        let total_current: i64 = workers.iter().map(|w| i64::from(w.current_streams)).sum();
        let total_max: i64 = workers.iter().map(|w| i64::from(w.max_streams)).sum();
        let total_available: i64 = workers.iter().map(|w| i64::from(w.available)).sum();

        Ok(FleetCapacity {
            utilization_percent: utilization(total_current, total_max),
            workers,
            total_current,
            total_max,
            total_available,
        })
    }

    /// Every worker that is not cleanly healthy, with the reason.
    pub async fn needs_attention(&self) -> Result<Vec<AttentionItem>, FleetError> {
        Ok(self
            .fleet_health()
            .await?
            .into_iter()
            .filter_map(|h| {
                h.reason.map(|reason| AttentionItem {
                    worker_id: h.worker_id,
                    name: h.name,
                    status: h.status,
                    reason,
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
