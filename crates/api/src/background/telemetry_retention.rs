//! Periodic cleanup of old telemetry samples.

use std::sync::Arc;
use std::time::Duration;

use streamfleet_fleet::telemetry::VpsStatsCollector;
use tokio_util::sync::CancellationToken;

use super::run_periodic;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Delete samples older than `retention_days` every hour until `cancel`
/// is triggered.
pub async fn run(collector: Arc<VpsStatsCollector>, retention_days: i64, cancel: CancellationToken) {
    tracing::info!(retention_days, "Telemetry retention job configured");

    run_periodic("telemetry_retention", CLEANUP_INTERVAL, cancel, || {
        let collector = Arc::clone(&collector);
        async move {
            match collector.prune(retention_days).await {
                Ok(0) => tracing::debug!("Telemetry retention: no rows to purge"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Telemetry retention: cleanup failed"),
            }
        }
    })
    .await;
}
