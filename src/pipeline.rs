use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::calibrate::Calibrator;
use crate::fetcher::TideTableFetcher;
use crate::reconcile::reconcile;
use crate::store::{SeriesStore, StoreError};

/// What one reconciliation cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing usable came back from the page; the series file was not
    /// touched.
    NoData,
    Merged {
        fetched: usize,
        inserted: usize,
        updated: usize,
        total: usize,
    },
}

/// One reconciliation cycle: fetch → calibrate → load → reconcile → save.
///
/// The load/merge/save sequence is a critical section: two interleaved
/// cycles would each load, merge their own batch, and save, and the second
/// save would silently discard the first batch. The cycle lock serializes
/// overlapping invocations (a scheduler tick racing a manual `--once` run).
pub struct ReconcilePipeline {
    fetcher: TideTableFetcher,
    store: SeriesStore,
    calibrator: Calibrator,
    cycle_lock: Mutex<()>,
}

impl ReconcilePipeline {
    pub fn new(fetcher: TideTableFetcher, store: SeriesStore, calibrator: Calibrator) -> Self {
        Self {
            fetcher,
            store,
            calibrator,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one full cycle. A failed or empty scrape is recovered locally as
    /// a no-op so a transient outage never truncates the historical record;
    /// store errors fail the cycle and the next tick retries from scratch.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleOutcome, StoreError> {
        let _guard = self.cycle_lock.lock().await;

        let raw = match self.fetcher.fetch_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Scrape failed ({}); leaving series untouched", e);
                return Ok(CycleOutcome::NoData);
            }
        };
        if raw.is_empty() {
            warn!("No data fetched; leaving series untouched");
            return Ok(CycleOutcome::NoData);
        }

        let batch = self.calibrator.calibrate_batch(&raw);
        if batch.is_empty() {
            warn!(
                "None of the {} scraped rows were usable; leaving series untouched",
                raw.len()
            );
            return Ok(CycleOutcome::NoData);
        }

        let existing = self.store.load()?;
        debug!(
            "Reconciling batch of {} against {} existing records",
            batch.len(),
            existing.len()
        );
        let merged = reconcile(&existing, &batch);

        let inserted = merged
            .iter()
            .filter(|r| existing.get(r.timestamp).is_none())
            .count();
        let updated = merged
            .iter()
            .filter(|r| matches!(existing.get(r.timestamp), Some(old) if old != *r))
            .count();

        self.store.save(&merged)?;
        info!(
            "Cycle merged {} scraped rows: {} inserted, {} updated, {} total",
            raw.len(),
            inserted,
            updated,
            merged.len()
        );

        Ok(CycleOutcome::Merged {
            fetched: raw.len(),
            inserted,
            updated,
            total: merged.len(),
        })
    }
}
