use serde::{Deserialize, Serialize};
use time::Date;

use crate::aggregate::{
    apply_activity, apply_tallies, audit_outcomes, ActivityReport, OutcomeAudit, TallyReport,
    DEFAULT_ACTIVITY_WINDOW_YEARS,
};
use crate::identity::parse_event_date;
use crate::knowledge::{backfill, BackfillReport, KnowledgeBase};
use crate::record::ContestRecord;
use crate::store::{IngestSummary, RecordStore};
use crate::LedgerError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum BackfillScope {
    /// Admit every event regardless of what the dataset already holds.
    RescanAll,
    /// Admit only events newer than the latest known event date.
    #[default]
    NewestOnly,
}

/// Bounded attempts with a fixed delay, handed to the fetch collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, delay_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub backfill_scope: BackfillScope,
    pub refresh_existing: bool,
    pub activity_window_years: u32,
    pub retry: RetryPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            backfill_scope: BackfillScope::default(),
            refresh_existing: false,
            activity_window_years: DEFAULT_ACTIVITY_WINDOW_YEARS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    /// # Errors
    /// Returns [`LedgerError::Config`] when the retry policy allows no attempt.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.retry.attempts == 0 {
            return Err(LedgerError::Config("retry.attempts MUST be at least 1".to_string()));
        }
        Ok(())
    }

    /// Whether an event dated `event_date` should still be fetched, given the
    /// latest event date already persisted.
    #[must_use]
    pub fn admits_event(&self, event_date: &str, latest_known: Option<Date>) -> bool {
        let Some(latest) = latest_known else {
            return true;
        };
        if self.backfill_scope == BackfillScope::RescanAll {
            return true;
        }
        let Some(date) = parse_event_date(event_date) else {
            return false;
        };
        if self.refresh_existing {
            date >= latest
        } else {
            date > latest
        }
    }
}

/// Apply observations to the store under `config`.
///
/// # Errors
/// Returns [`LedgerError::Config`] when `config` is invalid.
pub fn ingest<I>(
    store: &mut RecordStore,
    observations: I,
    config: &ReconcileConfig,
) -> Result<IngestSummary, LedgerError>
where
    I: IntoIterator<Item = ContestRecord>,
{
    config.validate()?;
    Ok(store.ingest(observations, config.refresh_existing))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnrichmentReport {
    pub backfill: BackfillReport,
    pub outcomes: OutcomeAudit,
    pub tallies: TallyReport,
    pub activity: ActivityReport,
}

/// Run backfill, then pre-contest tallies, then activity flags over the whole store.
///
/// # Errors
/// Returns [`LedgerError::Config`] when `config` is invalid.
pub fn enrich(
    store: &mut RecordStore,
    config: &ReconcileConfig,
    as_of: Date,
) -> Result<EnrichmentReport, LedgerError> {
    config.validate()?;

    let knowledge = KnowledgeBase::build(store);
    let backfill = backfill(store, &knowledge);
    let outcomes = audit_outcomes(store);
    let tallies = apply_tallies(store);
    let activity = apply_activity(store, as_of, config.activity_window_years);

    Ok(EnrichmentReport { backfill, outcomes, tallies, activity })
}
