//! Liveness endpoint mounted at the root, outside `/api/v1`.
//!
//! Always answers 200 so orchestrators can tell "process up" from "backends
//! up"; backend reachability is reported in the body.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok` when every backend answered, `degraded` otherwise.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Allocation reads worker load from here, so starts fail while it is down.
    pub fast_store_healthy: bool,
}

impl HealthReport {
    fn new(db_healthy: bool, fast_store_healthy: bool) -> Self {
        Self {
            status: if db_healthy && fast_store_healthy {
                "ok"
            } else {
                "degraded"
            },
            version: env!("CARGO_PKG_VERSION"),
            db_healthy,
            fast_store_healthy,
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let (db, fast_store) = tokio::join!(state.store.ping(), state.cache.ping());

    if let Err(e) = &fast_store {
        tracing::debug!(error = %e, "Fast store ping failed");
    }
    Json(HealthReport::new(db.is_ok(), fast_store.is_ok()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
