//! Core data types for the tide level series.
//!
//! Column names match the source table on the pilots' page verbatim; the
//! persisted CSV uses the same names so the file round-trips through the
//! scraper's vocabulary.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

/// Timestamp column, pattern `DD/MM/YYYY HH:MM`, naive local time.
pub const COL_TIMESTAMP: &str = "DD HH:MM";

/// Measured level column, meters.
pub const COL_MEASURED: &str = "Medição";

/// Forecast level column, meters. Absent in early table revisions.
pub const COL_FORECAST: &str = "Previsão";

/// How the source renders a sample with no reading.
pub const MISSING_SENTINEL: &str = "-";

/// chrono format for `COL_TIMESTAMP`, on the page and on disk.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

/// One observation of the lagoon level at a given minute.
///
/// `measured_m` is already calibrated (sensor-datum offset applied).
/// `forecast_m` is the published forecast, no offset. Columns the table
/// gained or lost across scraper revisions ride along in `extra` as text;
/// an absent key means that column is missing for this record.
#[derive(Debug, Clone, PartialEq)]
pub struct TideRecord {
    pub timestamp: NaiveDateTime,
    pub measured_m: Option<f64>,
    pub forecast_m: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

impl TideRecord {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            measured_m: None,
            forecast_m: None,
            extra: BTreeMap::new(),
        }
    }
}

/// The historical level series: ascending by timestamp, at most one record
/// per exact minute. Both invariants hold by construction; the only ways in
/// are `from_map` and the empty series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TideSeries {
    records: Vec<TideRecord>,
}

impl TideSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from records keyed by timestamp. The map already
    /// guarantees uniqueness and ascending iteration order.
    pub fn from_map(records: BTreeMap<NaiveDateTime, TideRecord>) -> Self {
        Self {
            records: records.into_values().collect(),
        }
    }

    pub fn records(&self) -> &[TideRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TideRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, timestamp: NaiveDateTime) -> Option<&TideRecord> {
        self.records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Whether any record carries a forecast value.
    pub fn has_forecast(&self) -> bool {
        self.records.iter().any(|r| r.forecast_m.is_some())
    }

    /// Union of drifted column names across all records.
    pub fn extra_columns(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|r| r.extra.keys().cloned())
            .collect()
    }
}

impl<'a> IntoIterator for &'a TideSeries {
    type Item = &'a TideRecord;
    type IntoIter = std::slice::Iter<'a, TideRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a level cell. `Ok(None)` means missing (the wire dash or an empty
/// field); `Err` means the cell held something that is neither a number nor
/// the missing-sentinel.
pub fn parse_level(text: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == MISSING_SENTINEL {
        return Ok(None);
    }
    trimmed.parse::<f64>().map(Some)
}

/// Serialize a level for the CSV: two fractional digits (the source
/// publishes centimeter resolution), empty field for missing.
pub fn format_level(level: Option<f64>) -> String {
    match level {
        Some(v) => format!("{:.2}", v),
        None => String::new(),
    }
}
