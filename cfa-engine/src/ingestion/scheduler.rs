//! Interval scheduler
//!
//! Runs a cycle immediately, then every `interval`. Ticks missed while a
//! cycle overruns are skipped, not queued. A failed cycle is logged and
//! recorded in `last_error`; the loop keeps going until cancelled. A cycle
//! in progress when cancellation arrives is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{CycleOutcome, IngestionCoordinator};

pub async fn run_scheduler(
    coordinator: Arc<IngestionCoordinator>,
    interval: Duration,
    last_error: Arc<RwLock<Option<String>>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = interval.as_secs(), "Ingestion scheduler started");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match coordinator.run_cycle().await {
            Ok(CycleOutcome::Completed(_)) => {
                *last_error.write().await = None;
            }
            Ok(CycleOutcome::AlreadyRunning) => {}
            Err(e) => {
                error!(error = %e, "Scheduled ingestion cycle failed");
                *last_error.write().await = Some(e.to_string());
            }
        }
    }

    info!("Ingestion scheduler stopped");
}
