use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::series::{
    format_level, format_timestamp, parse_level, parse_timestamp, TideRecord, TideSeries,
    COL_FORECAST, COL_MEASURED, COL_TIMESTAMP,
};
use crate::store::csv;
use crate::store::StoreError;

/// On-disk home of the historical series: one CSV file, header row of
/// column names, timestamp serialized as `DD/MM/YYYY HH:MM`.
///
/// `load` treats a missing file as the empty series (first-run bootstrap)
/// and rejects individual rows rather than whole files. `save` goes through
/// a temp file in the target directory and atomically replaces the old
/// file, so a crash mid-write never leaves a truncated series behind.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    path: PathBuf,
}

impl SeriesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<TideSeries, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No series file yet, starting from an empty series");
                return Ok(TideSeries::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut rows = csv::parse_rows(&text);
        if rows.is_empty() {
            return Ok(TideSeries::new());
        }
        let header = rows.remove(0);

        let timestamp_idx = header
            .iter()
            .position(|h| h == COL_TIMESTAMP)
            .ok_or(StoreError::MissingTimestampColumn(COL_TIMESTAMP))?;

        let mut records: BTreeMap<NaiveDateTime, TideRecord> = BTreeMap::new();
        let mut rejected_rows = 0;
        for row in &rows {
            let timestamp_text = cell(row, timestamp_idx);
            let timestamp = match parse_timestamp(timestamp_text) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(
                        "Rejecting stored row with bad timestamp '{}': {}",
                        timestamp_text, e
                    );
                    rejected_rows += 1;
                    continue;
                }
            };

            let mut record = TideRecord::new(timestamp);
            for (idx, column) in header.iter().enumerate() {
                if idx == timestamp_idx {
                    continue;
                }
                let text = cell(row, idx);
                if column == COL_MEASURED || column == COL_FORECAST {
                    let level = match parse_level(text) {
                        Ok(level) => level,
                        Err(e) => {
                            warn!(
                                "Unparseable {} '{}' at {}: {}",
                                column, text, timestamp_text, e
                            );
                            None
                        }
                    };
                    if column == COL_MEASURED {
                        record.measured_m = level;
                    } else {
                        record.forecast_m = level;
                    }
                } else if !text.is_empty() {
                    record.extra.insert(column.clone(), text.to_string());
                }
            }
            records.insert(timestamp, record);
        }

        if rejected_rows > 0 {
            warn!("Rejected {} of {} stored rows", rejected_rows, rows.len());
        }
        debug!("Loaded {} records from series file", records.len());

        Ok(TideSeries::from_map(records))
    }

    #[instrument(skip(self, series), fields(path = %self.path.display(), count = series.len()))]
    pub fn save(&self, series: &TideSeries) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        let has_forecast = series.has_forecast();
        let mut header = vec![COL_TIMESTAMP.to_string(), COL_MEASURED.to_string()];
        if has_forecast {
            header.push(COL_FORECAST.to_string());
        }
        let extra_columns: Vec<String> = series.extra_columns().into_iter().collect();
        header.extend(extra_columns.iter().cloned());

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            csv::write_row(&mut w, &header)?;
            for record in series {
                let mut row = vec![
                    format_timestamp(record.timestamp),
                    format_level(record.measured_m),
                ];
                if has_forecast {
                    row.push(format_level(record.forecast_m));
                }
                for column in &extra_columns {
                    row.push(record.extra.get(column).cloned().unwrap_or_default());
                }
                csv::write_row(&mut w, &row)?;
            }
            w.flush()?;
        }
        tmp.persist(&self.path)?;

        debug!("Wrote {} records to series file", series.len());
        Ok(())
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or_default()
}
