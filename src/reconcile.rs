use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::series::{TideRecord, TideSeries};

/// Merge a freshly calibrated batch into the existing series.
///
/// Concat-and-deduplicate with last-write-wins: duplicate timestamps within
/// the batch collapse to the last occurrence, then each batch record merges
/// over the existing record at the same timestamp column by column. The new
/// value wins unless it is missing, so a known value never regresses to
/// missing. Timestamps present on only one side are carried or inserted
/// as-is. Records whose measured level is still missing after the merge are
/// dropped from the output.
///
/// Pure: neither input is mutated. Feeding the same batch twice produces the
/// same series as feeding it once.
pub fn reconcile(existing: &TideSeries, batch: &[TideRecord]) -> TideSeries {
    let mut collapsed: BTreeMap<NaiveDateTime, &TideRecord> = BTreeMap::new();
    for record in batch {
        collapsed.insert(record.timestamp, record);
    }

    let mut merged: BTreeMap<NaiveDateTime, TideRecord> = existing
        .iter()
        .map(|r| (r.timestamp, r.clone()))
        .collect();

    let mut inserted = 0;
    let mut overwritten = 0;
    for (timestamp, record) in collapsed {
        match merged.entry(timestamp) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                inserted += 1;
            }
            Entry::Occupied(mut slot) => {
                let combined = merge_record(record, slot.get());
                slot.insert(combined);
                overwritten += 1;
            }
        }
    }

    let before_drop = merged.len();
    merged.retain(|_, record| record.measured_m.is_some());
    debug!(
        "Merged batch: {} inserted, {} overwrote existing, {} missing rows dropped",
        inserted,
        overwritten,
        before_drop - merged.len()
    );

    TideSeries::from_map(merged)
}

/// Column-wise merge of a batch record over the existing record at the same
/// timestamp: the new value wins unless missing. Columns only one side knows
/// about are kept from that side.
fn merge_record(new: &TideRecord, old: &TideRecord) -> TideRecord {
    let mut extra = old.extra.clone();
    extra.extend(new.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    TideRecord {
        timestamp: new.timestamp,
        measured_m: new.measured_m.or(old.measured_m),
        forecast_m: new.forecast_m.or(old.forecast_m),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::parse_timestamp;
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;

    fn ts(text: &str) -> NaiveDateTime {
        parse_timestamp(text).unwrap()
    }

    fn record(timestamp: &str, measured: Option<f64>) -> TideRecord {
        let mut r = TideRecord::new(ts(timestamp));
        r.measured_m = measured;
        r
    }

    fn series(records: Vec<TideRecord>) -> TideSeries {
        let map: BTreeMap<_, _> = records.into_iter().map(|r| (r.timestamp, r)).collect();
        TideSeries::from_map(map)
    }

    #[test]
    fn test_worked_example() {
        // existing [(T1, 1.10), (T2, 1.20)], batch [(T2, missing), (T3, 0.34 + 1.36)]
        let existing = series(vec![
            record("01/08/2024 10:00", Some(1.10)),
            record("01/08/2024 11:00", Some(1.20)),
        ]);
        let batch = vec![
            record("01/08/2024 11:00", None),
            record("01/08/2024 12:00", Some(0.34 + 1.36)),
        ];

        let merged = reconcile(&existing, &batch);
        let levels: Vec<_> = merged.iter().map(|r| r.measured_m.unwrap()).collect();
        assert_eq!(merged.len(), 3);
        assert_eq!(levels[0], 1.10);
        assert_eq!(levels[1], 1.20);
        assert!((levels[2] - 1.70).abs() < 1e-9);
    }

    #[test]
    fn test_no_duplicate_timestamps_and_sorted() {
        let existing = series(vec![
            record("01/08/2024 11:00", Some(1.20)),
            record("01/08/2024 10:00", Some(1.10)),
        ]);
        let batch = vec![
            record("01/08/2024 12:00", Some(1.30)),
            record("01/08/2024 10:00", Some(1.15)),
            record("01/08/2024 12:00", Some(1.35)),
        ];

        let merged = reconcile(&existing, &batch);
        let timestamps: Vec<_> = merged.iter().map(|r| r.timestamp).collect();
        let mut deduped = timestamps.clone();
        deduped.dedup();
        assert_eq!(timestamps, deduped);
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_last_occurrence_wins_within_batch() {
        let batch = vec![
            record("01/08/2024 10:00", Some(1.10)),
            record("01/08/2024 10:00", Some(1.25)),
        ];

        let merged = reconcile(&TideSeries::new(), &batch);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.records()[0].measured_m, Some(1.25));
    }

    #[test]
    fn test_batch_value_overwrites_existing() {
        let existing = series(vec![record("01/08/2024 10:00", Some(1.10))]);
        let batch = vec![record("01/08/2024 10:00", Some(1.45))];

        let merged = reconcile(&existing, &batch);
        assert_eq!(merged.records()[0].measured_m, Some(1.45));
    }

    #[test]
    fn test_missing_batch_value_never_regresses_existing() {
        let existing = series(vec![record("01/08/2024 10:00", Some(1.20))]);
        let batch = vec![record("01/08/2024 10:00", None)];

        let merged = reconcile(&existing, &batch);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.records()[0].measured_m, Some(1.20));
    }

    #[test]
    fn test_missing_rows_dropped_after_merge() {
        let mut placeholder = record("01/08/2024 13:00", None);
        placeholder.forecast_m = Some(0.50);
        let batch = vec![placeholder, record("01/08/2024 10:00", Some(1.10))];

        let merged = reconcile(&TideSeries::new(), &batch);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.records()[0].timestamp, ts("01/08/2024 10:00"));
    }

    #[test]
    fn test_empty_batch_is_identity() {
        let existing = series(vec![
            record("01/08/2024 10:00", Some(1.10)),
            record("01/08/2024 11:00", Some(1.20)),
        ]);

        let merged = reconcile(&existing, &[]);
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_empty_existing_yields_batch() {
        let batch = vec![
            record("01/08/2024 11:00", Some(1.20)),
            record("01/08/2024 10:00", Some(1.10)),
            record("01/08/2024 12:00", None),
        ];

        let merged = reconcile(&TideSeries::new(), &batch);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.records()[0].timestamp, ts("01/08/2024 10:00"));
    }

    #[test]
    fn test_re_merge_is_idempotent() {
        let existing = series(vec![record("01/08/2024 10:00", Some(1.10))]);
        let batch = vec![
            record("01/08/2024 10:00", None),
            record("01/08/2024 11:00", Some(1.55)),
        ];

        let once = reconcile(&existing, &batch);
        let twice = reconcile(&once, &batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let existing = series(vec![record("01/08/2024 10:00", Some(1.10))]);
        let snapshot = existing.clone();
        let batch = vec![record("01/08/2024 10:00", Some(1.45))];

        let _ = reconcile(&existing, &batch);
        assert_eq!(existing, snapshot);
    }

    #[test]
    fn test_forecast_follows_same_non_regression_rule() {
        let mut old = record("01/08/2024 10:00", Some(1.10));
        old.forecast_m = Some(0.42);
        let existing = series(vec![old]);

        let new = record("01/08/2024 10:00", Some(1.15));
        let merged = reconcile(&existing, &[new]);
        assert_eq!(merged.records()[0].forecast_m, Some(0.42));
    }

    #[test]
    fn test_schema_drift_columns_merge_without_error() {
        // Existing rows know a column the batch lacks, and vice versa.
        let mut old = record("01/08/2024 10:00", Some(1.10));
        old.extra.insert("Vento".to_string(), "NE".to_string());
        let existing = series(vec![old]);

        let mut new = record("01/08/2024 10:00", Some(1.15));
        new.extra.insert("Pressão".to_string(), "1013".to_string());

        let merged = reconcile(&existing, &[new]);
        let extra = &merged.records()[0].extra;
        assert_eq!(extra.get("Vento"), Some(&"NE".to_string()));
        assert_eq!(extra.get("Pressão"), Some(&"1013".to_string()));
    }

    #[test]
    fn test_existing_extra_value_survives_missing_batch_cell() {
        let mut old = record("01/08/2024 10:00", Some(1.10));
        old.extra.insert("Vento".to_string(), "NE".to_string());
        let existing = series(vec![old]);

        // The batch row has no Vento cell at all (column dropped upstream).
        let new = record("01/08/2024 10:00", Some(1.15));

        let merged = reconcile(&existing, &[new]);
        assert_eq!(
            merged.records()[0].extra.get("Vento"),
            Some(&"NE".to_string())
        );
    }
}
