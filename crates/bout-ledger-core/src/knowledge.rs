use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::identity::{is_blank, normalize_name};
use crate::record::{ProfileField, Side};
use crate::store::RecordStore;

/// How an attribute is expected to behave over a career.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    /// Fixed for life, e.g. birthplace. Filled from the most frequent value.
    Stable,
    /// Changes over time, e.g. training camp. Filled from the nearest dated value.
    TimeVarying,
}

pub const BACKFILL_FIELDS: [(ProfileField, Stability); 2] =
    [(ProfileField::Born, Stability::Stable), (ProfileField::Gym, Stability::TimeVarying)];

/// Highest-count value; ties go to the candidate with the greatest `tie_key`.
///
/// Candidates for which `tie_key` returns `None` cannot win a tie. Returns `None`
/// when the distribution is empty or no tied candidate has a key.
pub fn robust_mode<'a, K, F>(counts: &'a BTreeMap<String, usize>, tie_key: F) -> Option<&'a str>
where
    K: Ord,
    F: Fn(&str) -> Option<K>,
{
    let top = counts.values().copied().max()?;
    let candidates =
        counts.iter().filter(|(_, count)| **count == top).map(|(value, _)| value.as_str());
    let tied = candidates.collect::<Vec<_>>();
    if let [only] = tied.as_slice() {
        return Some(*only);
    }

    tied.into_iter()
        .filter_map(|value| tie_key(value).map(|key| (key, value)))
        .max_by(|lhs, rhs| lhs.0.cmp(&rhs.0))
        .map(|(_, value)| value)
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AttributeHistory {
    counts: BTreeMap<String, usize>,
    timeline: Vec<(Date, String)>,
}

impl AttributeHistory {
    pub fn observe(&mut self, date: Date, value: &str) {
        if is_blank(Some(value)) {
            return;
        }
        *self.counts.entry(value.to_string()).or_insert(0) += 1;
        self.timeline.push((date, value.to_string()));
    }

    fn finalize(&mut self) {
        self.timeline.sort_by_key(|(date, _)| *date);
    }

    #[must_use]
    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    #[must_use]
    pub fn timeline(&self) -> &[(Date, String)] {
        &self.timeline
    }

    fn latest_position(&self, value: &str) -> Option<usize> {
        self.timeline.iter().rposition(|(_, observed)| observed == value)
    }

    fn earliest_position(&self, value: &str) -> Option<usize> {
        self.timeline.iter().position(|(_, observed)| observed == value)
    }

    fn most_recent(&self) -> Option<&str> {
        self.timeline
            .iter()
            .rev()
            .find(|(_, value)| !is_blank(Some(value.as_str())))
            .map(|(_, value)| value.as_str())
    }

    /// Most frequent value, ties resolved by chronological first appearance.
    #[must_use]
    pub fn mode(&self) -> Option<&str> {
        robust_mode(&self.counts, |value| self.earliest_position(value).map(Reverse))
    }

    /// Most frequent value, ties resolved toward the most recently observed one,
    /// falling back to the most recent observation.
    #[must_use]
    pub fn mode_with_recent_fallback(&self) -> Option<&str> {
        robust_mode(&self.counts, |value| self.latest_position(value))
            .or_else(|| self.most_recent())
    }

    /// Value in force at `target`: the latest on or before it, else the earliest
    /// on or after it, else the mode.
    #[must_use]
    pub fn value_near(&self, target: Date) -> Option<&str> {
        let before = self
            .timeline
            .iter()
            .take_while(|(date, _)| *date <= target)
            .filter(|(_, value)| !is_blank(Some(value.as_str())))
            .last();
        if let Some((_, value)) = before {
            return Some(value);
        }

        let after = self
            .timeline
            .iter()
            .find(|(date, value)| *date >= target && !is_blank(Some(value.as_str())));
        if let Some((_, value)) = after {
            return Some(value);
        }

        self.mode()
    }

    #[must_use]
    pub fn select(&self, stability: Stability, target: Date) -> Option<&str> {
        match stability {
            Stability::Stable => self.mode_with_recent_fallback(),
            Stability::TimeVarying => self.value_near(target),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompetitorEntry {
    attributes: BTreeMap<ProfileField, AttributeHistory>,
    last_seen: Date,
}

impl Default for CompetitorEntry {
    fn default() -> Self {
        Self { attributes: BTreeMap::new(), last_seen: Date::MIN }
    }
}

impl CompetitorEntry {
    #[must_use]
    pub fn history(&self, field: ProfileField) -> Option<&AttributeHistory> {
        self.attributes.get(&field)
    }

    #[must_use]
    pub fn last_seen(&self) -> Date {
        self.last_seen
    }
}

/// Per-competitor projection over every dated record in the store.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: BTreeMap<String, CompetitorEntry>,
}

impl KnowledgeBase {
    #[must_use]
    pub fn build(store: &RecordStore) -> Self {
        let mut entries: BTreeMap<String, CompetitorEntry> = BTreeMap::new();

        for record in store.records() {
            let Some(date) = record.parsed_date() else {
                continue;
            };
            for side in Side::BOTH {
                let competitor = record.side(side);
                let name = normalize_name(&competitor.name);
                if name.is_empty() {
                    continue;
                }
                let entry = entries.entry(name).or_default();
                for (field, _) in BACKFILL_FIELDS {
                    let history = entry.attributes.entry(field).or_default();
                    if let Some(value) = competitor.profile_value(field) {
                        history.observe(date, value);
                    }
                }
                entry.last_seen = entry.last_seen.max(date);
            }
        }

        for entry in entries.values_mut() {
            for history in entry.attributes.values_mut() {
                history.finalize();
            }
        }

        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a competitor by display name; normalization is applied here.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&CompetitorEntry> {
        self.entries.get(&normalize_name(name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct BackfillReport {
    pub filled: BTreeMap<String, usize>,
}

impl BackfillReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.filled.values().sum()
    }
}

/// Fill blank backfillable attributes from each competitor's own history.
///
/// Populated fields are never touched. Records with no parseable date use the
/// minimum date as their target, so they pick up the earliest known value.
pub fn backfill(store: &mut RecordStore, knowledge: &KnowledgeBase) -> BackfillReport {
    let mut report = BackfillReport::default();
    for (field, _) in BACKFILL_FIELDS {
        report.filled.insert(field.as_str().to_string(), 0);
    }

    for record in store.records_mut() {
        let target = record.parsed_date().unwrap_or(Date::MIN);
        for side in Side::BOTH {
            let competitor = record.side_mut(side);
            if competitor.name.trim().is_empty() {
                continue;
            }
            let Some(entry) = knowledge.entry(&competitor.name) else {
                continue;
            };

            for (field, stability) in BACKFILL_FIELDS {
                if !is_blank(competitor.profile_value(field)) {
                    continue;
                }
                let Some(history) = entry.history(field) else {
                    continue;
                };
                let Some(value) = history.select(stability, target) else {
                    continue;
                };
                if is_blank(Some(value)) {
                    continue;
                }
                competitor.set_profile(field, value);
                *report.filled.entry(field.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }

    tracing::info!(filled = report.total(), "backfilled competitor attributes");
    report
}

#[cfg(test)]
mod tests {
    use time::Month;

    use super::*;
    use crate::record::ContestRecord;

    fn day(year: i32, month: Month, day: u8) -> Date {
        match Date::from_calendar_date(year, month, day) {
            Ok(date) => date,
            Err(err) => panic!("invalid fixture date: {err}"),
        }
    }

    fn history(observations: &[(Date, &str)]) -> AttributeHistory {
        let mut history = AttributeHistory::default();
        for (date, value) in observations {
            history.observe(*date, value);
        }
        history.finalize();
        history
    }

    fn counts(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(value, count)| ((*value).to_string(), *count)).collect()
    }

    #[test]
    fn robust_mode_prefers_frequency_then_tie_key() {
        let distribution = counts(&[("a", 2), ("b", 2), ("c", 1)]);
        assert_eq!(robust_mode(&distribution, |value| Some(value == "a")), Some("a"));
        assert_eq!(robust_mode(&distribution, |value| Some(value == "b")), Some("b"));

        let single = counts(&[("a", 1), ("b", 3)]);
        assert_eq!(robust_mode(&single, |_| None::<u8>), Some("b"));
        assert_eq!(robust_mode(&BTreeMap::new(), |_| Some(0_u8)), None);
    }

    #[test]
    fn robust_mode_without_tie_keys_yields_nothing_on_a_tie() {
        let distribution = counts(&[("a", 1), ("b", 1)]);
        assert_eq!(robust_mode(&distribution, |_| None::<u8>), None);
    }

    #[test]
    fn stable_attribute_ties_go_to_the_latest_value() {
        let born = history(&[
            (day(2015, Month::January, 1), "Lagos, Nigeria"),
            (day(2016, Month::January, 1), "Auckland, New Zealand"),
            (day(2017, Month::January, 1), "Auckland, New Zealand"),
            (day(2018, Month::January, 1), "Lagos, Nigeria"),
        ]);
        assert_eq!(born.mode_with_recent_fallback(), Some("Lagos, Nigeria"));

        let dominant = history(&[
            (day(2015, Month::January, 1), "Lagos, Nigeria"),
            (day(2016, Month::January, 1), "Lagos, Nigeria"),
            (day(2018, Month::January, 1), "Auckland, New Zealand"),
        ]);
        assert_eq!(dominant.mode_with_recent_fallback(), Some("Lagos, Nigeria"));
    }

    #[test]
    fn stable_attribute_with_no_history_has_no_value() {
        let empty = history(&[(day(2015, Month::January, 1), "Unknown")]);
        assert_eq!(empty.mode_with_recent_fallback(), None);
        assert!(empty.timeline().is_empty());
    }

    #[test]
    fn target_before_all_observations_uses_earliest_after() {
        let gym = history(&[
            (day(2019, Month::March, 1), "Camp A"),
            (day(2020, Month::March, 1), "Camp A"),
            (day(2021, Month::March, 1), "Camp B"),
        ]);
        assert_eq!(gym.value_near(day(2018, Month::January, 1)), Some("Camp A"));
        assert_eq!(gym.mode(), Some("Camp A"));
    }

    #[test]
    fn proximate_selection_disagrees_with_mode_when_the_career_moved() {
        let gym = history(&[
            (day(2019, Month::March, 1), "Camp A"),
            (day(2020, Month::March, 1), "Camp A"),
            (day(2021, Month::March, 1), "Camp B"),
        ]);
        assert_eq!(gym.value_near(day(2022, Month::June, 1)), Some("Camp B"));
        assert_eq!(gym.value_near(day(2021, Month::March, 1)), Some("Camp B"));
        assert_eq!(gym.value_near(day(2020, Month::December, 31)), Some("Camp A"));
        assert_eq!(gym.mode(), Some("Camp A"));
    }

    #[test]
    fn timeline_is_sorted_even_when_observed_out_of_order() {
        let gym = history(&[
            (day(2021, Month::March, 1), "Camp B"),
            (day(2019, Month::March, 1), "Camp A"),
        ]);
        assert_eq!(gym.value_near(day(2020, Month::January, 1)), Some("Camp A"));
    }

    fn bout(date: &str, a: &str, b: &str, a_gym: &str, a_born: &str) -> ContestRecord {
        let mut record = ContestRecord::new(date, a, b);
        record.side_mut(Side::First).set_profile(ProfileField::Gym, a_gym);
        record.side_mut(Side::First).set_profile(ProfileField::Born, a_born);
        record
    }

    #[test]
    fn backfill_fills_only_blank_fields_from_the_same_competitor() {
        let mut store = RecordStore::new();
        store.upsert(bout("2019-03-01", "Ana Silva", "X", "Camp A", "Rio, Brazil"));
        store.upsert(bout("2021-03-01", "ana  silva", "Y", "Camp B", ""));
        store.upsert(bout("2020-06-01", "Ana Silva", "Z", "unknown", "n/a"));
        store.upsert(bout("TBD", "Ana Silva", "W", "", ""));

        let knowledge = KnowledgeBase::build(&store);
        let report = backfill(&mut store, &knowledge);

        let lookup = |date: &str, opponent: &str| {
            let key = crate::identity::MergeKey::new(date, "Ana Silva", opponent);
            match store.get(&key) {
                Some(record) => record.side(Side::First).clone(),
                None => panic!("missing record for {date} vs {opponent}"),
            }
        };

        let mid_career = lookup("2020-06-01", "Z");
        assert_eq!(mid_career.profile_value(ProfileField::Gym), Some("Camp A"));
        assert_eq!(mid_career.profile_value(ProfileField::Born), Some("Rio, Brazil"));

        let late = lookup("2021-03-01", "Y");
        assert_eq!(late.profile_value(ProfileField::Gym), Some("Camp B"));
        assert_eq!(late.profile_value(ProfileField::Born), Some("Rio, Brazil"));

        let undated = lookup("TBD", "W");
        assert_eq!(undated.profile_value(ProfileField::Gym), Some("Camp A"));

        assert_eq!(report.filled.get("gym"), Some(&2));
        assert_eq!(report.filled.get("born"), Some(&3));
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn competitors_without_dated_history_are_left_alone() {
        let mut store = RecordStore::new();
        store.upsert(bout("TBD", "Lone Wolf", "X", "", ""));

        let knowledge = KnowledgeBase::build(&store);
        assert!(knowledge.entry("Lone Wolf").is_none());
        let report = backfill(&mut store, &knowledge);
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn knowledge_base_tracks_last_seen_date() {
        let mut store = RecordStore::new();
        store.upsert(bout("2019-03-01", "Ana Silva", "X", "Camp A", ""));
        store.upsert(bout("March 1, 2021", "X", "Ana Silva", "", ""));

        let knowledge = KnowledgeBase::build(&store);
        assert_eq!(knowledge.len(), 2);
        let Some(entry) = knowledge.entry("ANA SILVA") else {
            panic!("entry should exist");
        };
        assert_eq!(entry.last_seen(), day(2021, Month::March, 1));
        assert_eq!(
            entry.history(ProfileField::Gym).map(|history| history.counts().len()),
            Some(1)
        );
    }
}
