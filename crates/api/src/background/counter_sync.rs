//! Worker stream-counter resynchronization.

use std::sync::Arc;
use std::time::Duration;

use streamfleet_fleet::reconcile::Reconciler;
use tokio_util::sync::CancellationToken;

use super::run_periodic;

const SYNC_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run(reconciler: Arc<Reconciler>, cancel: CancellationToken) {
    run_periodic("counter_sync", SYNC_INTERVAL, cancel, || {
        let reconciler = Arc::clone(&reconciler);
        async move {
            if let Err(e) = reconciler.sync_stream_counters().await {
                tracing::error!(error = %e, "Stream counter sync failed");
            }
        }
    })
    .await;
}
