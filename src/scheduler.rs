use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::pipeline::{CycleOutcome, ReconcilePipeline};

/// Periodic driver: one reconciliation cycle per tick, each awaited to
/// completion before the next can start.
#[instrument(skip(pipeline), fields(interval_minutes = %interval_minutes))]
pub async fn start_fetch_scheduler(pipeline: Arc<ReconcilePipeline>, interval_minutes: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes * 60));

    info!(
        "Fetch scheduler started with {} minute interval",
        interval_minutes
    );

    loop {
        interval.tick().await;
        debug!("Scheduler tick - starting reconciliation cycle");

        match pipeline.run_cycle().await {
            Ok(CycleOutcome::Merged {
                fetched,
                inserted,
                updated,
                total,
            }) => {
                if inserted > 0 || updated > 0 {
                    info!(
                        "Cycle done: {} rows fetched, {} inserted, {} updated, {} in series",
                        fetched, inserted, updated, total
                    );
                } else {
                    debug!("Cycle done: nothing new ({} rows fetched)", fetched);
                }
            }
            Ok(CycleOutcome::NoData) => {
                warn!("Cycle ended without data; series left untouched");
            }
            Err(e) => {
                error!("Reconciliation cycle failed: {}", e);
            }
        }
    }
}
