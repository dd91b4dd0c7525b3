use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::identity::{iso_date, MergeKey};
use crate::record::{ContestRecord, FieldMap};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct IngestSummary {
    pub observed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_existing: usize,
    pub rejected: usize,
    pub undated_collisions: usize,
}

/// Working set of contest records keyed by order-insensitive merge key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStore {
    records: BTreeMap<MergeKey, ContestRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedDataset {
    pub store: RecordStore,
    pub rows_read: usize,
    pub latest_event_date: Option<Date>,
}

impl LoadedDataset {
    #[must_use]
    pub fn latest_event_date_iso(&self) -> Option<String> {
        self.latest_event_date.map(iso_date)
    }
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load previously persisted rows.
    ///
    /// Header keys are re-normalized, rows sharing a merge key collapse onto the
    /// last one read, and the latest parseable event date across every row read
    /// is reported for fetch scheduling.
    pub fn load<I>(rows: I) -> LoadedDataset
    where
        I: IntoIterator<Item = FieldMap>,
    {
        let mut store = Self::new();
        let mut rows_read = 0_usize;
        let mut latest_event_date: Option<Date> = None;

        for row in rows {
            rows_read += 1;
            let record = ContestRecord::from_raw_fields(&row);
            if let Some(date) = record.parsed_date() {
                latest_event_date = Some(latest_event_date.map_or(date, |known| known.max(date)));
            }
            store.records.insert(record.merge_key(), record);
        }

        tracing::debug!(
            rows_read,
            distinct_records = store.len(),
            latest_event_date = ?latest_event_date.map(iso_date),
            "loaded persisted contest records"
        );
        LoadedDataset { store, rows_read, latest_event_date }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &MergeKey) -> bool {
        self.records.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &MergeKey) -> Option<&ContestRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &MergeKey) -> Option<&mut ContestRecord> {
        self.records.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MergeKey, &ContestRecord)> {
        self.records.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &ContestRecord> {
        self.records.values()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ContestRecord> {
        self.records.values_mut()
    }

    #[must_use]
    pub fn latest_event_date(&self) -> Option<Date> {
        self.records.values().filter_map(ContestRecord::parsed_date).max()
    }

    /// Insert an unseen record or merge it into the stored one.
    pub fn upsert(&mut self, observed: ContestRecord) -> UpsertOutcome {
        let key = observed.merge_key();
        match self.records.entry(key) {
            Entry::Vacant(slot) => {
                tracing::debug!(key = %slot.key(), "inserting new contest record");
                slot.insert(observed);
                UpsertOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                let merged = slot.get().merged_with(&observed);
                if merged == *slot.get() {
                    return UpsertOutcome::Unchanged;
                }
                tracing::debug!(key = %slot.key(), "merged observation into stored record");
                slot.insert(merged);
                UpsertOutcome::Updated
            }
        }
    }

    /// Apply a batch of observations in encounter order.
    ///
    /// Known keys are skipped untouched unless `refresh_existing` is set.
    /// Observations missing a competitor name are rejected.
    pub fn ingest<I>(&mut self, observations: I, refresh_existing: bool) -> IngestSummary
    where
        I: IntoIterator<Item = ContestRecord>,
    {
        let mut summary = IngestSummary::default();
        for observed in observations {
            summary.observed += 1;
            if let Err(err) = observed.validate() {
                tracing::warn!(event_date = %observed.event_date, "rejected observation: {err}");
                summary.rejected += 1;
                continue;
            }

            let key = observed.merge_key();
            let known = self.contains(&key);
            if known && key.is_undated() {
                tracing::warn!(
                    key = %key,
                    raw_event_date = %observed.event_date,
                    "undated observation collides with an existing undated record of the same pairing"
                );
                summary.undated_collisions += 1;
            }
            if known && !refresh_existing {
                summary.skipped_existing += 1;
                continue;
            }

            match self.upsert(observed) {
                UpsertOutcome::Inserted => summary.inserted += 1,
                UpsertOutcome::Updated => summary.updated += 1,
                UpsertOutcome::Unchanged => summary.unchanged += 1,
            }
        }

        tracing::info!(
            observed = summary.observed,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped_existing = summary.skipped_existing,
            rejected = summary.rejected,
            "ingested observations"
        );
        summary
    }

    /// Flat column maps for the persistence layer, in merge-key order.
    #[must_use]
    pub fn to_rows(&self) -> Vec<FieldMap> {
        self.records.values().map(ContestRecord::to_fields).collect()
    }
}

#[cfg(test)]
mod tests {
    use time::Month;

    use super::*;
    use crate::record::{BoutField, ProfileField, Side};

    fn row(pairs: &[(&str, &str)]) -> FieldMap {
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
    }

    fn observation(date: &str, a: &str, b: &str, result: &str) -> ContestRecord {
        let mut record = ContestRecord::new(date, a, b);
        record.set_bout_value(BoutField::Result, result);
        record
    }

    #[test]
    fn load_normalizes_headers_and_reports_latest_date() {
        let loaded = RecordStore::load(vec![
            row(&[(" Event Date \u{feff}", "March 2, 2019"), ("Fighter 1", "A"), ("Fighter 2", "B")]),
            row(&[(" Event Date \u{feff}", "August 23, 2025"), ("Fighter 1", "C"), ("Fighter 2", "D")]),
            row(&[(" Event Date \u{feff}", "not a date"), ("Fighter 1", "E"), ("Fighter 2", "F")]),
        ]);

        assert_eq!(loaded.rows_read, 3);
        assert_eq!(loaded.store.len(), 3);
        assert_eq!(loaded.latest_event_date_iso().as_deref(), Some("2025-08-23"));
        assert_eq!(
            loaded.latest_event_date,
            Date::from_calendar_date(2025, Month::August, 23).ok()
        );
    }

    #[test]
    fn load_collapses_duplicate_rows_onto_the_last_one() {
        let loaded = RecordStore::load(vec![
            row(&[("event_date", "2020-01-01"), ("fighter_1", "A"), ("fighter_2", "B"), ("round", "1")]),
            row(&[("event_date", "January 1, 2020"), ("fighter_1", "b"), ("fighter_2", "a"), ("round", "3")]),
        ]);

        assert_eq!(loaded.rows_read, 2);
        assert_eq!(loaded.store.len(), 1);
        let Some(record) = loaded.store.records().next() else {
            panic!("store should hold one record");
        };
        assert_eq!(record.bout_value(BoutField::Round), Some("3"));
    }

    #[test]
    fn written_date_and_iso_observation_merge_into_one_record() {
        let mut store = RecordStore::load(vec![row(&[
            ("event_date", "August 23, 2025"),
            ("fighter_1", "Walker Johnny"),
            ("fighter_2", "Zhang Mingyang"),
            ("method_main", "KO/TKO"),
        ])])
        .store;

        let mut fresh = observation("2025-08-23", "Zhang Mingyang", "Walker Johnny", "win");
        fresh.set_bout_value(BoutField::MethodMain, "Unknown");
        let summary = store.ingest(vec![fresh], true);

        assert_eq!(store.len(), 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.inserted, 0);
        let Some(record) = store.records().next() else {
            panic!("store should hold one record");
        };
        assert_eq!(record.bout_value(BoutField::MethodMain), Some("KO/TKO"));
        assert_eq!(record.side(Side::First).name, "Walker Johnny");
        assert_eq!(record.result(), Some("loss"));
    }

    #[test]
    fn upsert_reports_inserted_updated_and_unchanged() {
        let mut store = RecordStore::new();
        let first = observation("2024-05-04", "A", "B", "win");
        assert_eq!(store.upsert(first.clone()), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(first), UpsertOutcome::Unchanged);

        let mut richer = observation("2024-05-04", "A", "B", "win");
        richer.side_mut(Side::First).set_profile(ProfileField::Stance, "Southpaw");
        assert_eq!(store.upsert(richer), UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn known_records_are_skipped_without_refresh() {
        let mut store = RecordStore::new();
        store.upsert(observation("2024-05-04", "A", "B", "win"));

        let summary = store.ingest(
            vec![observation("2024-05-04", "B", "A", "loss"), observation("2024-06-01", "C", "D", "")],
            false,
        );

        assert_eq!(summary.observed, 2);
        assert_eq!(summary.skipped_existing, 1);
        assert_eq!(summary.inserted, 1);
        let key = MergeKey::new("2024-05-04", "A", "B");
        assert_eq!(store.get(&key).and_then(ContestRecord::result), Some("win"));
    }

    #[test]
    fn undated_collisions_are_counted() {
        let mut store = RecordStore::new();
        store.upsert(observation("TBD", "A", "B", "win"));

        let summary = store.ingest(vec![observation("sometime", "A", "B", "loss")], true);

        assert_eq!(summary.undated_collisions, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn observations_without_both_names_are_rejected() {
        let mut store = RecordStore::new();
        let summary = store.ingest(vec![observation("2024-05-04", "A", "", "win")], true);
        assert_eq!(summary.rejected, 1);
        assert!(store.is_empty());
    }
}
