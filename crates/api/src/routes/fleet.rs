//! Route definitions for fleet monitoring endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::fleet;
use crate::state::AppState;

/// Routes mounted at `/fleet`.
///
/// ```text
/// GET  /summary                        -> get_summary
/// GET  /capacity                       -> get_capacity
/// GET  /attention                      -> list_attention
/// GET  /snapshot                       -> get_snapshot
/// GET  /workers                        -> list_worker_health
/// GET  /workers/{id}/health            -> get_worker_health
/// GET  /workers/{id}/stats             -> get_worker_stats
/// POST /workers/{id}/test-connection   -> test_connection
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(fleet::get_summary))
        .route("/capacity", get(fleet::get_capacity))
        .route("/attention", get(fleet::list_attention))
        .route("/snapshot", get(fleet::get_snapshot))
        .route("/workers", get(fleet::list_worker_health))
        .route("/workers/{id}/health", get(fleet::get_worker_health))
        .route("/workers/{id}/stats", get(fleet::get_worker_stats))
        .route("/workers/{id}/test-connection", post(fleet::test_connection))
}
