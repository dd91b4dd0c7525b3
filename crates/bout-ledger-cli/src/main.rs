use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bout_ledger_core::{
    enrich, ingest, iso_date, ordered_columns, parse_event_date, BackfillScope, ContestRecord,
    MergeKey, ReconcileConfig, RecordStore,
};
use bout_ledger_store_csv::{read_dataset, read_observations, write_dataset};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "bl")]
#[command(about = "Bout Ledger CLI")]
struct Cli {
    #[arg(long, default_value = "./bout_ledger.csv")]
    dataset: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge observations into the dataset, then backfill, tally and flag activity.
    Reconcile(ReconcileArgs),
    /// Report the latest parseable event date in the dataset.
    LatestDate,
    /// Decide whether an event would be fetched given the dataset's latest date.
    Admit(AdmitArgs),
    /// Print the merge key for a pairing.
    Key(KeyArgs),
}

#[derive(Debug, Args)]
struct PolicyArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    refresh_existing: bool,
    #[arg(long, value_enum)]
    backfill_scope: Option<BackfillScopeArg>,
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    #[command(flatten)]
    policy: PolicyArgs,
    /// NDJSON file with one observed contest per line.
    #[arg(long)]
    observations: Option<PathBuf>,
    #[arg(long)]
    window_years: Option<u32>,
    /// Reference date for activity flags; defaults to today (UTC).
    #[arg(long)]
    as_of: Option<String>,
    /// Write here instead of overwriting the dataset.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct AdmitArgs {
    #[command(flatten)]
    policy: PolicyArgs,
    #[arg(long)]
    event_date: String,
}

#[derive(Debug, Args)]
struct KeyArgs {
    #[arg(long)]
    event_date: String,
    #[arg(long)]
    fighter_a: String,
    #[arg(long)]
    fighter_b: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackfillScopeArg {
    RescanAll,
    NewestOnly,
}

impl BackfillScopeArg {
    fn into_scope(self) -> BackfillScope {
        match self {
            Self::RescanAll => BackfillScope::RescanAll,
            Self::NewestOnly => BackfillScope::NewestOnly,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Reconcile(args) => run_reconcile(&cli.dataset, &args),
        Command::LatestDate => run_latest_date(&cli.dataset),
        Command::Admit(args) => run_admit(&cli.dataset, &args),
        Command::Key(args) => run_key(&args),
    }
}

fn load_config(policy: &PolicyArgs) -> Result<ReconcileConfig> {
    let mut config = match policy.config.as_ref() {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str::<ReconcileConfig>(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => ReconcileConfig::default(),
    };

    if policy.refresh_existing {
        config.refresh_existing = true;
    }
    if let Some(scope) = policy.backfill_scope {
        config.backfill_scope = scope.into_scope();
    }
    config.validate()?;
    Ok(config)
}

fn parse_as_of(value: Option<&str>) -> Result<Date> {
    match value {
        Some(raw) => parse_event_date(raw).ok_or_else(|| anyhow!("invalid --as-of date: {raw}")),
        None => Ok(OffsetDateTime::now_utc().date()),
    }
}

fn run_reconcile(dataset: &Path, args: &ReconcileArgs) -> Result<()> {
    let mut config = load_config(&args.policy)?;
    if let Some(years) = args.window_years {
        config.activity_window_years = years;
    }
    let as_of = parse_as_of(args.as_of.as_deref())?;
    let run_id = Ulid::new();
    tracing::info!(%run_id, dataset = %dataset.display(), "starting reconcile run");

    let persisted = read_dataset(dataset)?;
    let loaded = RecordStore::load(persisted.rows);
    let latest_before = loaded.latest_event_date;
    let rows_read = loaded.rows_read;
    let mut store = loaded.store;

    let mut admitted = Vec::new();
    let mut not_admitted = 0_usize;
    if let Some(path) = args.observations.as_ref() {
        for fields in read_observations(path)? {
            let observed = ContestRecord::from_raw_fields(&fields);
            if config.admits_event(&observed.event_date, latest_before) {
                admitted.push(observed);
            } else {
                not_admitted += 1;
            }
        }
    }
    if not_admitted > 0 {
        tracing::info!(not_admitted, "observations predate the latest known event");
    }

    let ingested = ingest(&mut store, admitted, &config)?;
    let enrichment = enrich(&mut store, &config, as_of)?;

    let rows = store.to_rows();
    let columns = ordered_columns(&rows);
    let target = args.out.clone().unwrap_or_else(|| dataset.to_path_buf());
    let written = if args.dry_run { None } else { Some(write_dataset(&target, &rows, &columns)?) };

    emit_json(serde_json::json!({
        "run_id": run_id.to_string(),
        "dataset": dataset,
        "dry_run": args.dry_run,
        "as_of": iso_date(as_of),
        "config": config,
        "source_encoding": persisted.encoding,
        "rows_read": rows_read,
        "latest_event_date_before": latest_before.map(iso_date),
        "not_admitted": not_admitted,
        "ingest": ingested,
        "enrichment": enrichment,
        "records": store.len(),
        "latest_event_date_after": store.latest_event_date().map(iso_date),
        "written": written
    }))
}

fn run_latest_date(dataset: &Path) -> Result<()> {
    let persisted = read_dataset(dataset)?;
    let loaded = RecordStore::load(persisted.rows);
    emit_json(serde_json::json!({
        "dataset": dataset,
        "rows_read": loaded.rows_read,
        "records": loaded.store.len(),
        "latest_event_date": loaded.latest_event_date_iso()
    }))
}

fn run_admit(dataset: &Path, args: &AdmitArgs) -> Result<()> {
    let config = load_config(&args.policy)?;
    let persisted = read_dataset(dataset)?;
    let latest = RecordStore::load(persisted.rows).latest_event_date;
    emit_json(serde_json::json!({
        "event_date": args.event_date,
        "normalized_event_date": parse_event_date(&args.event_date).map(iso_date),
        "latest_event_date": latest.map(iso_date),
        "backfill_scope": config.backfill_scope,
        "refresh_existing": config.refresh_existing,
        "admitted": config.admits_event(&args.event_date, latest)
    }))
}

fn run_key(args: &KeyArgs) -> Result<()> {
    let key = MergeKey::new(&args.event_date, &args.fighter_a, &args.fighter_b);
    emit_json(serde_json::json!({
        "merge_key": key,
        "undated": key.is_undated()
    }))
}
