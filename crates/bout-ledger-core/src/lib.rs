pub mod aggregate;
pub mod columns;
pub mod identity;
pub mod knowledge;
pub mod reconcile;
pub mod record;
pub mod store;

pub use aggregate::{
    activity_window_days, apply_activity, apply_tallies, audit_outcomes, ActivityReport, Outcome,
    OutcomeAudit, TallyReport, DEFAULT_ACTIVITY_WINDOW_YEARS,
};
pub use columns::{ordered_columns, PRIORITY_COLUMNS};
pub use identity::{
    is_blank, is_unknown, iso_date, normalize_event_date, normalize_header, normalize_name,
    parse_event_date, MergeKey,
};
pub use knowledge::{backfill, robust_mode, BackfillReport, KnowledgeBase, Stability};
pub use reconcile::{
    enrich, ingest, BackfillScope, EnrichmentReport, ReconcileConfig, RetryPolicy,
};
pub use record::{BoutField, ContestRecord, FieldMap, ProfileField, Side, SideRecord};
pub use store::{IngestSummary, LoadedDataset, RecordStore, UpsertOutcome};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("config error: {0}")]
    Config(String),
}
