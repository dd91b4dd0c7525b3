use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::identity::{normalize_name, MergeKey};
use crate::record::Side;
use crate::store::RecordStore;

pub const DEFAULT_ACTIVITY_WINDOW_YEARS: u32 = 3;

/// Result descriptor read from the first competitor's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
    NoContest,
    Missing,
    Unrecognized,
}

impl Outcome {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let lowered = raw.map(|value| value.trim().to_lowercase()).unwrap_or_default();
        if lowered.is_empty() {
            Self::Missing
        } else if lowered.starts_with("win") {
            Self::Win
        } else if lowered.starts_with("loss") || lowered == "l" {
            Self::Loss
        } else if lowered.starts_with("draw") {
            Self::Draw
        } else if matches!(lowered.as_str(), "nc" | "no contest" | "no_contest") {
            Self::NoContest
        } else {
            Self::Unrecognized
        }
    }

    /// Tally change for the first and second competitor.
    fn deltas(self) -> Option<(Side, Side)> {
        match self {
            Self::Win => Some((Side::First, Side::Second)),
            Self::Loss => Some((Side::Second, Side::First)),
            Self::Draw | Self::NoContest | Self::Missing | Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct OutcomeAudit {
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub no_contests: usize,
    pub missing: usize,
    pub unrecognized: usize,
    /// Distinct unrecognized descriptors with their occurrence counts.
    pub unrecognized_values: BTreeMap<String, usize>,
}

/// Classify every stored result and warn about descriptors that carry no tally.
#[must_use]
pub fn audit_outcomes(store: &RecordStore) -> OutcomeAudit {
    let mut audit = OutcomeAudit::default();
    for record in store.records() {
        match Outcome::parse(record.result()) {
            Outcome::Win => audit.wins += 1,
            Outcome::Loss => audit.losses += 1,
            Outcome::Draw => audit.draws += 1,
            Outcome::NoContest => audit.no_contests += 1,
            Outcome::Missing => audit.missing += 1,
            Outcome::Unrecognized => {
                audit.unrecognized += 1;
                let raw = record.result().unwrap_or_default().trim().to_string();
                *audit.unrecognized_values.entry(raw).or_insert(0) += 1;
            }
        }
    }

    for (value, count) in &audit.unrecognized_values {
        tracing::warn!(result = %value, count, "result descriptor does not move any tally");
    }
    audit
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct TallyReport {
    pub competitors: usize,
    pub sides_written: usize,
}

struct Appearance {
    date: Date,
    side: Side,
    key: MergeKey,
}

fn appearances_by_competitor(store: &RecordStore) -> BTreeMap<String, Vec<Appearance>> {
    let mut walks: BTreeMap<String, Vec<Appearance>> = BTreeMap::new();
    for (key, record) in store.iter() {
        let date = record.parsed_date().unwrap_or(Date::MIN);
        for side in Side::BOTH {
            let name = normalize_name(&record.side(side).name);
            if name.is_empty() {
                continue;
            }
            walks.entry(name).or_default().push(Appearance { date, side, key: key.clone() });
        }
    }
    for walk in walks.values_mut() {
        walk.sort_by_key(|appearance| appearance.date);
    }
    walks
}

/// Write each side's win/loss tally as it stood before that contest.
///
/// Every competitor's contests are walked oldest first; undated contests sort
/// ahead of everything else. Contests on the same date keep merge-key order.
pub fn apply_tallies(store: &mut RecordStore) -> TallyReport {
    let walks = appearances_by_competitor(store);
    let mut report = TallyReport { competitors: walks.len(), sides_written: 0 };

    for walk in walks.values() {
        let (mut wins, mut losses) = (0_u32, 0_u32);
        for appearance in walk {
            let Some(record) = store.get_mut(&appearance.key) else {
                continue;
            };
            let competitor = record.side_mut(appearance.side);
            competitor.wins = Some(wins);
            competitor.losses = Some(losses);
            report.sides_written += 1;

            if let Some((winner, loser)) = Outcome::parse(record.result()).deltas() {
                if appearance.side == winner {
                    wins += 1;
                } else if appearance.side == loser {
                    losses += 1;
                }
            }
        }
    }

    tracing::info!(
        competitors = report.competitors,
        sides_written = report.sides_written,
        "computed pre-contest tallies"
    );
    report
}

/// Inclusive activity window in days: `365.25 * years` rounded half to even.
///
/// Two years is 730 days and six years is 2192.
#[must_use]
pub fn activity_window_days(years: u32) -> i64 {
    let quarters = i64::from(years) * 1461;
    let (days, remainder) = (quarters / 4, quarters % 4);
    if remainder > 2 || (remainder == 2 && days % 2 == 1) {
        days + 1
    } else {
        days
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ActivityReport {
    pub window_days: i64,
    pub active_sides: usize,
    pub inactive_sides: usize,
}

/// Flag each side active when the competitor's latest dated contest falls
/// within the window ending at `as_of`.
pub fn apply_activity(store: &mut RecordStore, as_of: Date, window_years: u32) -> ActivityReport {
    let mut last_seen: BTreeMap<String, Date> = BTreeMap::new();
    for record in store.records() {
        let Some(date) = record.parsed_date() else {
            continue;
        };
        for side in Side::BOTH {
            let name = normalize_name(&record.side(side).name);
            if name.is_empty() {
                continue;
            }
            last_seen.entry(name).and_modify(|seen| *seen = (*seen).max(date)).or_insert(date);
        }
    }

    let window_days = activity_window_days(window_years);
    let mut report = ActivityReport { window_days, ..ActivityReport::default() };
    for record in store.records_mut() {
        for side in Side::BOTH {
            let competitor = record.side_mut(side);
            let active = last_seen
                .get(&normalize_name(&competitor.name))
                .is_some_and(|last| (as_of - *last).whole_days() <= window_days);
            competitor.active = Some(active);
            if active {
                report.active_sides += 1;
            } else {
                report.inactive_sides += 1;
            }
        }
    }

    tracing::info!(
        window_days,
        active_sides = report.active_sides,
        inactive_sides = report.inactive_sides,
        "derived activity flags"
    );
    report
}
