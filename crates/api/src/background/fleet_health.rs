//! Periodic fleet health report in the logs.

use std::sync::Arc;
use std::time::Duration;

use streamfleet_fleet::monitor::VpsMonitor;
use tokio_util::sync::CancellationToken;

use super::run_periodic;

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(monitor: Arc<VpsMonitor>, cancel: CancellationToken) {
    run_periodic("fleet_health", REPORT_INTERVAL, cancel, || {
        let monitor = Arc::clone(&monitor);
        async move {
            match monitor.fleet_summary().await {
                Ok(summary) => tracing::info!(
                    total = summary.total,
                    healthy = summary.healthy,
                    offline = summary.offline,
                    overloaded = summary.overloaded,
                    unknown = summary.unknown,
                    reporting_recently = summary.reporting_recently,
                    "Fleet health",
                ),
                Err(e) => {
                    tracing::error!(error = %e, "Fleet health check failed");
                    return;
                }
            }
            match monitor.needs_attention().await {
                Ok(items) => {
                    for item in items {
                        tracing::warn!(
                            worker_id = item.worker_id,
                            name = %item.name,
                            status = ?item.status,
                            reason = %item.reason,
                            "Worker needs attention",
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "Attention scan failed"),
            }
        }
    })
    .await;
}
