//! Detection of worker processes for streams nobody should be running.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use streamfleet_fleet::reconcile::Reconciler;
use tokio_util::sync::CancellationToken;

use super::run_periodic;

const SCAN_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(reconciler: Arc<Reconciler>, cancel: CancellationToken) {
    run_periodic("zombie_streams", SCAN_INTERVAL, cancel, || {
        let reconciler = Arc::clone(&reconciler);
        async move {
            match reconciler.detect_zombie_streams(Utc::now()).await {
                Ok(zombies) if !zombies.is_empty() => {
                    tracing::warn!(count = zombies.len(), "Cleaned up zombie streams");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Zombie stream scan failed"),
            }
        }
    })
    .await;
}
