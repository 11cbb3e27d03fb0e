use tracing::{debug, instrument, warn};

use crate::fetcher::RawReading;
use crate::series::{
    parse_level, parse_timestamp, TideRecord, COL_FORECAST, COL_MEASURED, COL_TIMESTAMP,
};

/// Sensor-datum correction for the Rio Grande gauge, meters.
pub const DEFAULT_OFFSET_M: f64 = 1.36;

/// Applies the fixed calibration offset to raw measurements.
///
/// Only freshly scraped batches ever pass through here. Values already in
/// the persisted series are carried forward untouched by the reconciler, so
/// the offset lands exactly once per raw value.
#[derive(Debug, Clone)]
pub struct Calibrator {
    offset_m: f64,
}

impl Calibrator {
    pub fn new(offset_m: f64) -> Self {
        Self { offset_m }
    }

    pub fn offset_m(&self) -> f64 {
        self.offset_m
    }

    /// Calibrate one raw measurement cell. The missing-sentinel propagates
    /// as missing, never as zero. Unparseable text degrades to missing with
    /// a warning.
    pub fn calibrate(&self, raw: &str) -> Option<f64> {
        match parse_level(raw) {
            Ok(Some(value)) => Some(value + self.offset_m),
            Ok(None) => None,
            Err(e) => {
                warn!("Unparseable measurement '{}': {}", raw, e);
                None
            }
        }
    }

    /// Normalize a scraped batch into typed records, calibrating the
    /// measured column. Rows without a parseable timestamp are skipped;
    /// batch order is preserved so later duplicates can win downstream.
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    pub fn calibrate_batch(&self, rows: &[RawReading]) -> Vec<TideRecord> {
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped_rows = 0;

        for row in rows {
            let timestamp_text = row.get(COL_TIMESTAMP).unwrap_or_default();
            let timestamp = match parse_timestamp(timestamp_text) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(
                        "Skipping scraped row with bad timestamp '{}': {}",
                        timestamp_text, e
                    );
                    skipped_rows += 1;
                    continue;
                }
            };

            let mut record = TideRecord::new(timestamp);
            record.measured_m = self.calibrate(row.get(COL_MEASURED).unwrap_or_default());
            record.forecast_m = match parse_level(row.get(COL_FORECAST).unwrap_or_default()) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Unparseable forecast in row {}: {}", timestamp_text, e);
                    None
                }
            };

            for (column, cell) in row.columns() {
                if column == COL_TIMESTAMP || column == COL_MEASURED || column == COL_FORECAST {
                    continue;
                }
                let trimmed = cell.trim();
                if !trimmed.is_empty() && trimmed != crate::series::MISSING_SENTINEL {
                    record.extra.insert(column.clone(), trimmed.to_string());
                }
            }

            records.push(record);
        }

        if skipped_rows > 0 {
            warn!("Skipped {} of {} scraped rows", skipped_rows, rows.len());
        }
        debug!("Calibrated {} records", records.len());

        records
    }
}
