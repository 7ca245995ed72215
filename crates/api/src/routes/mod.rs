pub mod fleet;
pub mod health;
pub mod streams;

use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /telemetry                                 worker telemetry push (POST)
///
/// /streams/{id}/start                        start on a worker (POST)
/// /streams/{id}/stop                         stop (POST)
/// /streams/{id}/force-stop                   stop, forcing INACTIVE on failure (POST)
/// /streams/{id}/recover                      ERROR -> INACTIVE (POST)
/// /streams/{id}/progress                     live progress
///
/// /fleet/summary                             health counts
/// /fleet/capacity                            stream slots
/// /fleet/attention                           workers needing attention
/// /fleet/snapshot                            latest sample per worker
/// /fleet/workers                             health of every worker
/// /fleet/workers/{id}/health                 health of one worker
/// /fleet/workers/{id}/stats                  telemetry aggregates (?hours=)
/// /fleet/workers/{id}/test-connection        remote shell check (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/telemetry", post(handlers::telemetry::push_telemetry))
        .nest("/streams", streams::router())
        .nest("/fleet", fleet::router())
}
