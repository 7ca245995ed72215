//! Route definitions for stream lifecycle endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::streams;
use crate::state::AppState;

/// Routes mounted at `/streams`.
///
/// ```text
/// POST /{id}/start           -> start_stream
/// POST /{id}/stop            -> stop_stream
/// POST /{id}/force-stop      -> force_stop_stream
/// POST /{id}/recover         -> recover_stream
/// GET  /{id}/progress        -> get_progress
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/start", post(streams::start_stream))
        .route("/{id}/stop", post(streams::stop_stream))
        .route("/{id}/force-stop", post(streams::force_stop_stream))
        .route("/{id}/recover", post(streams::recover_stream))
        .route("/{id}/progress", get(streams::get_progress))
}
