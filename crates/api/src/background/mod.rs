//! Background tasks and scheduled jobs.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All tasks accept a [`CancellationToken`]
//! for graceful shutdown.
//!
//! A task runs its pass inline in the loop, so a slow pass delays the next
//! tick instead of overlapping with it; missed ticks are skipped.

pub mod counter_sync;
pub mod fleet_health;
pub mod stream_reconciliation;
pub mod telemetry_retention;
pub mod zombie_streams;

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Run `pass` every `period` until `cancel` fires. The first pass runs
/// immediately.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!(task = name, interval_secs = period.as_secs(), "Background task started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(task = name, "Background task stopping");
                break;
            }
            _ = interval.tick() => {
                pass().await;
            }
        }
    }
}

/// Spawn every periodic task over the shared state.
pub fn spawn_all(state: &AppState, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(telemetry_retention::run(
            state.collector.clone(),
            state.fleet_config.telemetry_retention_days,
            cancel.clone(),
        )),
        tokio::spawn(stream_reconciliation::run(
            state.reconciler.clone(),
            cancel.clone(),
        )),
        tokio::spawn(counter_sync::run(state.reconciler.clone(), cancel.clone())),
        tokio::spawn(zombie_streams::run(state.reconciler.clone(), cancel.clone())),
        tokio::spawn(fleet_health::run(state.monitor.clone(), cancel.clone())),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
