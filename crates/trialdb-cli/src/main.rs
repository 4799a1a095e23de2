mod config;
mod ingest;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use trialdb_core::{
    ConflictPolicy, ExperimentStore, LogParser, Metric, Record, TrialFilter, WILDCARD,
};
use trialdb_store::SqliteStore;

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "trialdb",
    version,
    about = "Store and query network measurement trial results"
)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse trial logs from a directory and store the results
    Ingest {
        /// Directory holding the logs (default: ingest.log_dir from config)
        dir: Option<PathBuf>,

        /// Only ingest files whose name starts with this prefix
        #[arg(short, long)]
        pattern: Option<String>,

        /// What to do when a trial is already stored
        #[arg(long)]
        policy: Option<CliPolicy>,
    },

    /// List stored trials matching a filter
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the distinct values of every key field
    Keys,

    /// List failed trials (no samples), i.e. the re-run worklist
    Failed,

    /// Summarise one metric for every matching trial
    Summary {
        /// Metric: packets, retrans, loss, fragments, frames, bytes, time, dtime
        #[arg(short, long)]
        metric: Metric,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Delete the database file
    Remove,

    /// Show the active configuration
    Config,
}

/// Key filter; an omitted field (or -1) matches any value.
#[derive(Args)]
struct FilterArgs {
    /// Traffic interval
    #[arg(short, long, allow_hyphen_values = true)]
    interval: Option<i64>,

    /// Receive ratio (percent)
    #[arg(short, long, allow_hyphen_values = true)]
    ratio: Option<i64>,

    /// Transport unit size (bytes)
    #[arg(short, long, allow_hyphen_values = true)]
    unit: Option<i64>,

    /// Data size (bytes)
    #[arg(short, long, allow_hyphen_values = true)]
    size: Option<i64>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<TrialFilter> {
        let raw = [self.interval, self.ratio, self.unit, self.size].map(|v| v.unwrap_or(WILDCARD));
        Ok(TrialFilter::from_raw(raw)?)
    }
}

#[derive(Clone, ValueEnum)]
enum CliPolicy {
    /// Keep the stored samples
    Ignore,
    /// Overwrite the stored samples
    Replace,
    /// Append the new attempts to the stored ones
    Merge,
}

impl From<CliPolicy> for ConflictPolicy {
    fn from(val: CliPolicy) -> Self {
        match val {
            CliPolicy::Ignore => ConflictPolicy::Ignore,
            CliPolicy::Replace => ConflictPolicy::Replace,
            CliPolicy::Merge => ConflictPolicy::Merge,
        }
    }
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "trialdb", "trialdb")
        .map(|dirs| dirs.data_dir().join("rslts.db"))
        .unwrap_or_else(|| PathBuf::from("rslts.db"))
}

fn db_path(db: Option<PathBuf>, cfg: &Config) -> PathBuf {
    db.or_else(|| cfg.store.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;
    let path = db_path(cli.db, &cfg);

    match cli.command {
        Commands::Remove => return cmd_remove(&path),
        Commands::Config => return cmd_config(&cfg, &path),
        _ => {}
    }

    let store = SqliteStore::new(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;

    let result = match cli.command {
        Commands::Ingest {
            dir,
            pattern,
            policy,
        } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&cfg.ingest.log_dir));
            let pattern = pattern.unwrap_or_else(|| cfg.ingest.pattern.clone());
            let policy = policy.map(Into::into).unwrap_or(cfg.ingest.policy);
            let parser = LogParser::new(cfg.parser.clone());
            cmd_ingest(&store, &parser, dir, &pattern, policy)
        }
        Commands::Query { filter, json } => cmd_query(&store, &filter, json),
        Commands::Keys => cmd_keys(&store),
        Commands::Failed => cmd_failed(&store),
        Commands::Summary { metric, filter } => cmd_summary(&store, metric, &filter),
        Commands::Remove | Commands::Config => unreachable!("handled before opening the store"),
    };

    // Close on every path so the last write is flushed before exit.
    let closed = store.close();
    result?;
    closed.context("failed to close database")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_ingest(
    store: &SqliteStore,
    parser: &LogParser,
    dir: PathBuf,
    pattern: &str,
    policy: ConflictPolicy,
) -> Result<()> {
    let report = ingest::ingest_dir(store, parser, &dir, pattern, policy)?;
    let tally = report.tally;

    if tally.total() == 0 && report.failures.is_empty() {
        bail!("no file in {} matches '{pattern}*.log'", dir.display());
    }

    println!(
        "Stored {} trial(s): {} new, {} conflicts (policy={policy}: {} ignored, {} replaced, {} merged).",
        tally.total(),
        tally.inserted,
        tally.conflicts(),
        tally.ignored,
        tally.replaced,
        tally.merged
    );

    if !report.failures.is_empty() {
        for (name, reason) in &report.failures {
            eprintln!("  failed: {name}: {reason}");
        }
        bail!("{} file(s) failed to load", report.failures.len());
    }
    Ok(())
}

fn cmd_query(store: &SqliteStore, filter: &FilterArgs, json: bool) -> Result<()> {
    let mut records = store.query(&filter.to_filter()?)?;
    records.sort_by_key(|r| r.key);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No trials found.");
        return Ok(());
    }
    print_record_header();
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn cmd_keys(store: &SqliteStore) -> Result<()> {
    let values = store.distinct_key_values()?;
    let join = |v: &[u32]| {
        v.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("Traffic intervals: {}", join(&values.traffic_intervals));
    println!("Receive ratios:    {}", join(&values.receive_ratios));
    println!("Unit sizes:        {}", join(&values.unit_sizes));
    println!("Data sizes:        {}", join(&values.data_sizes));
    Ok(())
}

fn cmd_failed(store: &SqliteStore) -> Result<()> {
    let mut records = store.failed_records()?;
    if records.is_empty() {
        println!("No failed trials.");
        return Ok(());
    }
    records.sort_by_key(|r| r.key);
    for record in &records {
        println!("{}", record.key);
    }
    println!("{} trial(s) to re-run.", records.len());
    Ok(())
}

fn cmd_summary(store: &SqliteStore, metric: Metric, filter: &FilterArgs) -> Result<()> {
    let mut records = store.query(&filter.to_filter()?)?;
    if records.is_empty() {
        println!("No trials found.");
        return Ok(());
    }
    records.sort_by_key(|r| r.key);

    println!(
        "{:<20} {:>5} {:>12} {:>12} {:>12} {:>12}",
        "Trial", "n", "mean", "std", "min", "max"
    );
    println!("{}", "-".repeat(78));
    for record in &records {
        match record.samples.as_ref().and_then(|m| m.summary(metric)) {
            Some(s) => println!(
                "{:<20} {:>5} {:>12.3} {:>12.3} {:>12.3} {:>12.3}",
                record.key.to_string(),
                s.count,
                s.mean,
                s.std_dev,
                s.min,
                s.max
            ),
            None => println!("{:<20} {:>5} {:>12}", record.key.to_string(), 0, "no data"),
        }
    }
    Ok(())
}

fn cmd_remove(path: &std::path::Path) -> Result<()> {
    if SqliteStore::remove(path)? {
        println!("Removed: {}", path.display());
    } else {
        println!("Nothing to remove at {}", path.display());
    }
    Ok(())
}

fn cmd_config(cfg: &Config, path: &std::path::Path) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[store]");
    println!("  path = {}", path.display());
    println!();
    println!("[ingest]");
    println!("  log_dir = {}", cfg.ingest.log_dir);
    println!("  pattern = {:?}", cfg.ingest.pattern);
    println!("  policy = {}", cfg.ingest.policy);
    println!();
    println!("[parser]");
    println!("  outcome_marker = {:?}", cfg.parser.outcome_marker);
    Ok(())
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn print_record_header() {
    println!(
        "{:>8} {:>6} {:>6} {:>8} {:>6} {:>7}",
        "interval", "ratio", "unit", "size", "rows", "failed"
    );
    println!("{}", "-".repeat(46));
}

fn print_record(record: &Record) {
    let k = record.key;
    match &record.samples {
        Some(m) => println!(
            "{:>8} {:>6} {:>6} {:>8} {:>6} {:>7}",
            k.traffic_interval,
            k.receive_ratio,
            k.unit_size,
            k.data_size,
            m.row_count(),
            m.failed_attempts()
        ),
        None => println!(
            "{:>8} {:>6} {:>6} {:>8} {:>6} {:>7}",
            k.traffic_interval, k.receive_ratio, k.unit_size, k.data_size, "-", "trial"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_wildcard_filters() {
        let cli = Cli::try_parse_from(["trialdb", "query", "--ratio", "50", "--unit", "-1"]).unwrap();
        let Commands::Query { filter, json } = cli.command else {
            panic!("expected query command");
        };
        assert!(!json);
        assert_eq!(filter.to_filter().unwrap(), TrialFilter::any().receive_ratio(50));
    }

    #[test]
    fn test_cli_rejects_negative_filter() {
        let cli = Cli::try_parse_from(["trialdb", "query", "--size", "-5"]).unwrap();
        let Commands::Query { filter, .. } = cli.command else {
            panic!("expected query command");
        };
        assert!(filter.to_filter().is_err());
    }

    #[test]
    fn test_cli_parses_ingest_policy() {
        let cli = Cli::try_parse_from(["trialdb", "ingest", "logs", "--policy", "merge"]).unwrap();
        let Commands::Ingest { policy, .. } = cli.command else {
            panic!("expected ingest command");
        };
        let policy: ConflictPolicy = policy.unwrap().into();
        assert_eq!(policy, ConflictPolicy::Merge);
    }

    #[test]
    fn test_cli_parses_metric() {
        let cli = Cli::try_parse_from(["trialdb", "summary", "--metric", "loss"]).unwrap();
        let Commands::Summary { metric, .. } = cli.command else {
            panic!("expected summary command");
        };
        assert_eq!(metric, Metric::LossPercent);
    }

    #[test]
    fn test_db_path_precedence() {
        let mut cfg = Config::default();
        cfg.store.path = Some("/tmp/from-config.db".into());
        assert_eq!(
            db_path(Some(PathBuf::from("/tmp/flag.db")), &cfg),
            PathBuf::from("/tmp/flag.db")
        );
        assert_eq!(db_path(None, &cfg), PathBuf::from("/tmp/from-config.db"));
    }
}
