//! Handlers for stream lifecycle endpoints.

use axum::extract::{Path, State};
use serde::Serialize;
use streamfleet_core::error::CoreError;
use streamfleet_core::stream_state::StreamStatus;
use streamfleet_core::telemetry::ActiveStreamReport;
use streamfleet_core::types::DbId;
use streamfleet_db::models::telemetry::StreamProgress;
use streamfleet_fleet::cache::warn_throttled;
use streamfleet_fleet::error::StreamError;
use streamfleet_fleet::reconcile::StopOutcome;

use crate::error::AppResult;
use crate::response::{data, DataJson};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// State of a stream after a lifecycle action.
#[derive(Debug, Serialize)]
pub struct StreamActionResponse {
    pub stream_id: DbId,
    pub status: StreamStatus,
    pub vps_server_id: Option<DbId>,
}

#[derive(Debug, Serialize)]
pub struct ForceStopResponse {
    pub stream_id: DbId,
    #[serde(flatten)]
    pub outcome: StopOutcome,
}

/// Progress of a running stream, from the fast store when available.
#[derive(Debug, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ProgressView {
    Live(ActiveStreamReport),
    Durable(StreamProgress),
}

// ---------------------------------------------------------------------------
// POST /streams/{id}/start
// ---------------------------------------------------------------------------

pub async fn start_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<DbId>,
) -> AppResult<DataJson<StreamActionResponse>> {
    let vps_id = state.manager.start_stream(stream_id).await?;
    Ok(data(StreamActionResponse {
        stream_id,
        status: StreamStatus::Streaming,
        vps_server_id: Some(vps_id),
    }))
}

// ---------------------------------------------------------------------------
// POST /streams/{id}/stop
// ---------------------------------------------------------------------------

pub async fn stop_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<DbId>,
) -> AppResult<DataJson<StreamActionResponse>> {
    state.manager.stop_stream(stream_id).await?;
    Ok(data(StreamActionResponse {
        stream_id,
        status: StreamStatus::Inactive,
        vps_server_id: None,
    }))
}

// ---------------------------------------------------------------------------
// POST /streams/{id}/force-stop
// ---------------------------------------------------------------------------

/// Stop a stream; if the stop path fails the stream is marked INACTIVE
/// anyway and the outcome says so.
pub async fn force_stop_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<DbId>,
) -> AppResult<DataJson<ForceStopResponse>> {
    let outcome = state.reconciler.stop_stream_gracefully(stream_id).await?;
    Ok(data(ForceStopResponse { stream_id, outcome }))
}

// ---------------------------------------------------------------------------
// POST /streams/{id}/recover
// ---------------------------------------------------------------------------

pub async fn recover_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<DbId>,
) -> AppResult<DataJson<StreamActionResponse>> {
    state.manager.recover(stream_id).await?;
    Ok(data(StreamActionResponse {
        stream_id,
        status: StreamStatus::Inactive,
        vps_server_id: None,
    }))
}

// ---------------------------------------------------------------------------
// GET /streams/{id}/progress
// ---------------------------------------------------------------------------

/// Live status from the fast store, falling back to the durable progress
/// row when the fast store has nothing or cannot be reached.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(stream_id): Path<DbId>,
) -> AppResult<DataJson<ProgressView>> {
    if state.store.get_stream(stream_id).await?.is_none() {
        return Err(StreamError::NotFound(stream_id).into());
    }

    match state.cache.live_status(stream_id).await {
        Ok(Some(report)) => {
            return Ok(data(ProgressView::Live(report)));
        }
        Ok(None) => {}
        Err(e) => warn_throttled(&state.throttle, "api.live_status", &e),
    }

    let progress = state
        .store
        .find_progress(stream_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "StreamProgress",
            id: stream_id,
        })?;
    Ok(data(ProgressView::Durable(progress)))
}
