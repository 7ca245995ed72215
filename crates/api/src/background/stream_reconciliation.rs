//! Stuck-state sweeps for streams left in STOPPING or STARTING.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use streamfleet_fleet::reconcile::Reconciler;
use tokio_util::sync::CancellationToken;

use super::run_periodic;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(reconciler: Arc<Reconciler>, cancel: CancellationToken) {
    run_periodic("stream_reconciliation", SWEEP_INTERVAL, cancel, || {
        let reconciler = Arc::clone(&reconciler);
        async move {
            let now = Utc::now();
            match reconciler.sweep_stuck_stopping(now).await {
                Ok(0) => {}
                Ok(fixed) => tracing::info!(fixed, "Released streams stuck in stopping"),
                Err(e) => tracing::error!(error = %e, "Stuck stopping sweep failed"),
            }
            match reconciler.sweep_stuck_starting(now).await {
                Ok(0) => {}
                Ok(fixed) => tracing::info!(fixed, "Failed streams stuck in starting"),
                Err(e) => tracing::error!(error = %e, "Stuck starting sweep failed"),
            }
        }
    })
    .await;
}
