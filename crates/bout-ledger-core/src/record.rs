use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::aggregate::Outcome;
use crate::identity::{is_unknown, normalize_header, normalize_name, parse_event_date, MergeKey};
use crate::LedgerError;

pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];

    /// Column prefix for names, profile fields and career statistics.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::First => "fighter_1",
            Self::Second => "fighter_2",
        }
    }

    /// Column prefix for per-bout strike breakdowns.
    #[must_use]
    pub fn short_prefix(self) -> &'static str {
        match self {
            Self::First => "f1",
            Self::Second => "f2",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Record,
    Height,
    Weight,
    Reach,
    Stance,
    Dob,
    Born,
    Gym,
}

impl ProfileField {
    pub const ALL: [ProfileField; 8] = [
        ProfileField::Record,
        ProfileField::Height,
        ProfileField::Weight,
        ProfileField::Reach,
        ProfileField::Stance,
        ProfileField::Dob,
        ProfileField::Born,
        ProfileField::Gym,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Height => "height",
            Self::Weight => "weight",
            Self::Reach => "reach",
            Self::Stance => "stance",
            Self::Dob => "dob",
            Self::Born => "born",
            Self::Gym => "gym",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BoutField {
    EventLocation,
    Result,
    MethodMain,
    MethodDetail,
    Round,
    Time,
    WeightClass,
}

impl BoutField {
    pub const ALL: [BoutField; 7] = [
        BoutField::EventLocation,
        BoutField::Result,
        BoutField::MethodMain,
        BoutField::MethodDetail,
        BoutField::Round,
        BoutField::Time,
        BoutField::WeightClass,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventLocation => "event_location",
            Self::Result => "result",
            Self::MethodMain => "method_main",
            Self::MethodDetail => "method_detail",
            Self::Round => "round",
            Self::Time => "time",
            Self::WeightClass => "weight_class",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

const WINS_SUFFIX: &str = "ufcwins";
const LOSSES_SUFFIX: &str = "ufcloss";
const ACTIVE_SUFFIX: &str = "active";

/// One competitor's columns within a contest record.
///
/// `None` means the column was not part of the observation; `Some("")` means it
/// was observed blank. Merge treats the two differently.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct SideRecord {
    pub name: String,
    #[serde(default)]
    pub profile: BTreeMap<ProfileField, String>,
    pub wins: Option<u32>,
    pub losses: Option<u32>,
    pub active: Option<bool>,
    /// `fighter_N_<attr>` columns outside the profile, e.g. `kd`, `slpm`.
    #[serde(default)]
    pub stats: BTreeMap<String, String>,
    /// `fN_<attr>` per-bout breakdown columns, e.g. `sig_str_landed`.
    #[serde(default)]
    pub bout_stats: BTreeMap<String, String>,
}

impl SideRecord {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self { name: name.trim().to_string(), ..Self::default() }
    }

    #[must_use]
    pub fn profile_value(&self, field: ProfileField) -> Option<&str> {
        self.profile.get(&field).map(String::as_str)
    }

    pub fn set_profile(&mut self, field: ProfileField, value: &str) {
        self.profile.insert(field, value.trim().to_string());
    }

    fn merge_from(&mut self, incoming: &SideRecord) {
        merge_required(&mut self.name, &incoming.name);
        for (field, value) in &incoming.profile {
            merge_keyed(&mut self.profile, *field, value);
        }
        if incoming.wins.is_some() {
            self.wins = incoming.wins;
        }
        if incoming.losses.is_some() {
            self.losses = incoming.losses;
        }
        if incoming.active.is_some() {
            self.active = incoming.active;
        }
        for (key, value) in &incoming.stats {
            merge_keyed(&mut self.stats, key.clone(), value);
        }
        for (key, value) in &incoming.bout_stats {
            merge_keyed(&mut self.bout_stats, key.clone(), value);
        }
    }

    fn absorb_prefixed(&mut self, suffix: &str, value: &str) {
        if let Some(field) = ProfileField::parse(suffix) {
            self.profile.insert(field, value.to_string());
            return;
        }
        match suffix {
            WINS_SUFFIX => self.wins = value.parse().ok(),
            LOSSES_SUFFIX => self.losses = value.parse().ok(),
            ACTIVE_SUFFIX => self.active = parse_flag(value),
            _ => {
                self.stats.insert(suffix.to_string(), value.to_string());
            }
        }
    }

    fn write_fields(&self, side: Side, fields: &mut FieldMap) {
        let prefix = side.prefix();
        let short = side.short_prefix();
        fields.insert(prefix.to_string(), self.name.clone());
        for (field, value) in &self.profile {
            fields.insert(format!("{prefix}_{}", field.as_str()), value.clone());
        }
        if let Some(wins) = self.wins {
            fields.insert(format!("{prefix}_{WINS_SUFFIX}"), wins.to_string());
        }
        if let Some(losses) = self.losses {
            fields.insert(format!("{prefix}_{LOSSES_SUFFIX}"), losses.to_string());
        }
        if let Some(active) = self.active {
            fields.insert(format!("{prefix}_{ACTIVE_SUFFIX}"), format_flag(active).to_string());
        }
        for (key, value) in &self.stats {
            fields.insert(format!("{prefix}_{key}"), value.clone());
        }
        for (key, value) in &self.bout_stats {
            fields.insert(format!("{short}_{key}"), value.clone());
        }
    }
}

/// One observed pairing of two competitors on one date.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ContestRecord {
    pub event_date: String,
    #[serde(default)]
    pub bout: BTreeMap<BoutField, String>,
    pub sides: [SideRecord; 2],
    /// Unprefixed columns this schema does not name.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ContestRecord {
    #[must_use]
    pub fn new(event_date: &str, fighter_1: &str, fighter_2: &str) -> Self {
        Self {
            event_date: event_date.trim().to_string(),
            bout: BTreeMap::new(),
            sides: [SideRecord::named(fighter_1), SideRecord::named(fighter_2)],
            extra: BTreeMap::new(),
        }
    }

    /// Build a record from a flat column map whose keys are already canonical.
    ///
    /// Values are trimmed. `date` is accepted as a legacy alias of `event_date`.
    #[must_use]
    pub fn from_fields(fields: &FieldMap) -> Self {
        let mut record = Self::default();
        let has_event_date = fields.contains_key("event_date");

        for (key, raw_value) in fields {
            let value = raw_value.trim();
            match key.as_str() {
                "event_date" => value.clone_into(&mut record.event_date),
                // An alias only when `event_date` is absent; otherwise kept as its own column.
                "date" if !has_event_date => value.clone_into(&mut record.event_date),
                "fighter_1" => value.clone_into(&mut record.sides[0].name),
                "fighter_2" => value.clone_into(&mut record.sides[1].name),
                _ => record.absorb_column(key, value),
            }
        }
        record
    }

    /// Same as [`ContestRecord::from_fields`] but re-normalizes header keys first.
    #[must_use]
    pub fn from_raw_fields(fields: &FieldMap) -> Self {
        Self::from_fields(&normalize_fields(fields))
    }

    fn absorb_column(&mut self, key: &str, value: &str) {
        if let Some(field) = BoutField::parse(key) {
            self.bout.insert(field, value.to_string());
            return;
        }
        for side in Side::BOTH {
            if let Some(suffix) = strip_side_prefix(key, side.prefix()) {
                self.sides[side.index()].absorb_prefixed(suffix, value);
                return;
            }
            if let Some(suffix) = strip_side_prefix(key, side.short_prefix()) {
                self.sides[side.index()].bout_stats.insert(suffix.to_string(), value.to_string());
                return;
            }
        }
        self.extra.insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("event_date".to_string(), self.event_date.clone());
        for (field, value) in &self.bout {
            fields.insert(field.as_str().to_string(), value.clone());
        }
        for side in Side::BOTH {
            self.side(side).write_fields(side, &mut fields);
        }
        for (key, value) in &self.extra {
            fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
        fields
    }

    #[must_use]
    pub fn merge_key(&self) -> MergeKey {
        MergeKey::new(&self.event_date, &self.sides[0].name, &self.sides[1].name)
    }

    #[must_use]
    pub fn parsed_date(&self) -> Option<Date> {
        parse_event_date(&self.event_date)
    }

    #[must_use]
    pub fn side(&self, side: Side) -> &SideRecord {
        &self.sides[side.index()]
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideRecord {
        &mut self.sides[side.index()]
    }

    #[must_use]
    pub fn bout_value(&self, field: BoutField) -> Option<&str> {
        self.bout.get(&field).map(String::as_str)
    }

    pub fn set_bout_value(&mut self, field: BoutField, value: &str) {
        self.bout.insert(field, value.trim().to_string());
    }

    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.bout_value(BoutField::Result)
    }

    /// An observation must name both competitors to be reconciled.
    ///
    /// # Errors
    /// Returns [`LedgerError::Validation`] when either competitor name is blank.
    pub fn validate(&self) -> Result<(), LedgerError> {
        for side in Side::BOTH {
            if self.side(side).name.trim().is_empty() {
                return Err(LedgerError::Validation(format!(
                    "{} name MUST be provided",
                    side.prefix()
                )));
            }
        }
        Ok(())
    }

    /// The same contest with the competitors listed the other way round.
    ///
    /// Side columns travel with their competitor and a decisive result is
    /// flipped. Other result descriptors are kept as they are.
    #[must_use]
    pub fn mirrored(&self) -> ContestRecord {
        let mut mirrored = self.clone();
        mirrored.sides.swap(0, 1);
        if let Some(result) = mirrored.bout.get_mut(&BoutField::Result) {
            match Outcome::parse(Some(result.as_str())) {
                Outcome::Win => "loss".clone_into(result),
                Outcome::Loss => "win".clone_into(result),
                _ => {}
            }
        }
        mirrored
    }

    fn lists_sides_reversed(&self, other: &ContestRecord) -> bool {
        let mine = self.sides.each_ref().map(|side| normalize_name(&side.name));
        let theirs = other.sides.each_ref().map(|side| normalize_name(&side.name));
        mine[0] != mine[1] && mine[0] == theirs[1] && mine[1] == theirs[0]
    }

    /// Fold `incoming` into this record field by field.
    ///
    /// Present incoming values replace stored ones unless the incoming value is
    /// empty or `unknown` and the stored value is non-empty. Fields absent from
    /// `incoming` are left alone. An observation listing the competitors in the
    /// other order is mirrored first, so stored side labels never move.
    pub fn merge_from(&mut self, incoming: &ContestRecord) {
        let aligned;
        let incoming = if self.lists_sides_reversed(incoming) {
            aligned = incoming.mirrored();
            &aligned
        } else {
            incoming
        };

        merge_required(&mut self.event_date, &incoming.event_date);
        for (field, value) in &incoming.bout {
            merge_keyed(&mut self.bout, *field, value);
        }
        for side in Side::BOTH {
            self.side_mut(side).merge_from(incoming.side(side));
        }
        for (key, value) in &incoming.extra {
            merge_keyed(&mut self.extra, key.clone(), value);
        }
    }

    #[must_use]
    pub fn merged_with(&self, incoming: &ContestRecord) -> ContestRecord {
        let mut merged = self.clone();
        merged.merge_from(incoming);
        merged
    }
}

/// Re-key a raw persisted row with canonical header names.
#[must_use]
pub fn normalize_fields(fields: &FieldMap) -> FieldMap {
    fields.iter().map(|(key, value)| (normalize_header(key), value.clone())).collect()
}

fn strip_side_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?.strip_prefix('_').filter(|suffix| !suffix.is_empty())
}

fn keeps_existing(existing: Option<&str>, incoming: &str) -> bool {
    is_unknown(incoming) && existing.is_some_and(|value| !value.trim().is_empty())
}

fn merge_required(existing: &mut String, incoming: &str) {
    if keeps_existing(Some(existing.as_str()), incoming) {
        return;
    }
    incoming.trim().clone_into(existing);
}

fn merge_keyed<K: Ord>(existing: &mut BTreeMap<K, String>, key: K, incoming: &str) {
    if keeps_existing(existing.get(&key).map(String::as_str), incoming) {
        return;
    }
    existing.insert(key, incoming.trim().to_string());
}

fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn format_flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}
