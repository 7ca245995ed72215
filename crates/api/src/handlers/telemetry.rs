//! Handler for the worker telemetry push.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use streamfleet_core::telemetry::TelemetryPayload;

use crate::response::{data, DataJson};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TelemetryAck {
    pub accepted: bool,
}

/// POST /api/v1/telemetry
///
/// Accepts a sample from a worker agent. Invalid payloads and unknown
/// workers are answered with 422 and `accepted: false`; nothing is raised.
pub async fn push_telemetry(
    State(state): State<AppState>,
    payload: Result<Json<TelemetryPayload>, JsonRejection>,
) -> (StatusCode, DataJson<TelemetryAck>) {
    let accepted = match payload {
        Ok(Json(payload)) => state.collector.store_sample(&payload).await,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable telemetry payload");
            false
        }
    };

    let status = if accepted {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, data(TelemetryAck { accepted }))
}
