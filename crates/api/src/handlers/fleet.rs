//! Handlers for fleet monitoring endpoints.

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use streamfleet_core::error::CoreError;
use streamfleet_core::types::DbId;
use streamfleet_db::models::telemetry::TelemetrySample;
use streamfleet_fleet::connection::ConnectionCheck;
use streamfleet_fleet::monitor::{AttentionItem, FleetCapacity, FleetSummary, WorkerHealth};
use streamfleet_fleet::telemetry::{WorkerStats, MAX_STATS_HOURS};

use crate::error::{AppError, AppResult};
use crate::response::{data, DataJson};
use crate::state::AppState;

/// Default window for the worker stats endpoint.
const DEFAULT_STATS_HOURS: i64 = 24;

/// Query parameters for the worker stats endpoint.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// How many hours of history to aggregate (default: 24).
    pub hours: Option<i64>,
}

fn worker_not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "VpsServer",
        id,
    })
}

/// GET /fleet/summary
pub async fn get_summary(
    State(state): State<AppState>,
) -> AppResult<DataJson<FleetSummary>> {
    let summary = state.monitor.fleet_summary().await?;
    Ok(data(summary))
}

/// GET /fleet/capacity
///
/// Stream slots across active workers.
pub async fn get_capacity(
    State(state): State<AppState>,
) -> AppResult<DataJson<FleetCapacity>> {
    let capacity = state.monitor.capacity().await?;
    Ok(data(capacity))
}

/// GET /fleet/attention
pub async fn list_attention(
    State(state): State<AppState>,
) -> AppResult<DataJson<Vec<AttentionItem>>> {
    let items = state.monitor.needs_attention().await?;
    Ok(data(items))
}

/// GET /fleet/snapshot
///
/// Latest sample of every worker that reported in the last hour.
pub async fn get_snapshot(
    State(state): State<AppState>,
) -> AppResult<DataJson<Vec<TelemetrySample>>> {
    let samples = state.collector.fleet_snapshot().await?;
    Ok(data(samples))
}

/// GET /fleet/workers
pub async fn list_worker_health(
    State(state): State<AppState>,
) -> AppResult<DataJson<Vec<WorkerHealth>>> {
    let workers = state.monitor.fleet_health().await?;
    Ok(data(workers))
}

/// GET /fleet/workers/{id}/health
pub async fn get_worker_health(
    State(state): State<AppState>,
    Path(worker_id): Path<DbId>,
) -> AppResult<DataJson<WorkerHealth>> {
    let health = state
        .monitor
        .health(worker_id)
        .await?
        .ok_or_else(|| worker_not_found(worker_id))?;
    Ok(data(health))
}

/// GET /fleet/workers/{id}/stats?hours=
pub async fn get_worker_stats(
    State(state): State<AppState>,
    Path(worker_id): Path<DbId>,
    Query(query): Query<StatsQuery>,
) -> AppResult<DataJson<WorkerStats>> {
    let hours = query.hours.unwrap_or(DEFAULT_STATS_HOURS);
    if !(1..=MAX_STATS_HOURS).contains(&hours) {
        return Err(AppError::BadRequest(format!(
            "hours must be between 1 and {MAX_STATS_HOURS}"
        )));
    }
    let stats = state
        .collector
        .worker_stats(worker_id, hours)
        .await?
        .ok_or_else(|| worker_not_found(worker_id))?;
    Ok(data(stats))
}

/// POST /fleet/workers/{id}/test-connection
///
/// Runs a trivial command over the remote shell and reports latency.
pub async fn test_connection(
    State(state): State<AppState>,
    Path(worker_id): Path<DbId>,
) -> AppResult<DataJson<ConnectionCheck>> {
    let vps = state
        .store
        .get_vps(worker_id)
        .await?
        .ok_or_else(|| worker_not_found(worker_id))?;
    let check = state.shell.test_connection(&vps).await;
    if !check.ok {
        tracing::warn!(worker_id, error = ?check.error, "Connection test failed");
    }
    Ok(data(check))
}
