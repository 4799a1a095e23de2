//! Batch ingestion of trial logs.
//!
//! Every `*.log` file in a directory whose name starts with the given
//! prefix is parsed and inserted, one file at a time. Bad filenames,
//! unreadable files and malformed logs are recorded and skipped; store
//! failures abort the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use trialdb_core::{
    ConflictPolicy, ExperimentStore, InsertTally, LogParser, Record, TrialError, TrialKey,
    TrialResult,
};

#[derive(Debug, Default)]
pub struct IngestReport {
    pub tally: InsertTally,
    /// `(filename, reason)` for every file that was skipped.
    pub failures: Vec<(String, String)>,
}

/// Log files in `dir` whose name starts with `pattern`, sorted by name.
pub fn matching_logs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;

    let mut logs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading directory {}", dir.display()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.starts_with(pattern) && name.ends_with(".log") {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}

/// Derive the key from the filename and parse the file's contents.
pub fn load_log(parser: &LogParser, path: &Path) -> TrialResult<Record> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TrialError::MalformedFilename(path.display().to_string()))?;
    let key = TrialKey::from_log_name(name)?;

    let bytes = std::fs::read(path)?;
    let samples = parser.parse(&String::from_utf8_lossy(&bytes))?;
    Ok(Record::new(key, samples))
}

pub fn ingest_dir(
    store: &impl ExperimentStore,
    parser: &LogParser,
    dir: &Path,
    pattern: &str,
    policy: ConflictPolicy,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for path in matching_logs(dir, pattern)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let record = match load_log(parser, &path) {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping {name}: {e}");
                report.failures.push((name, e.to_string()));
                continue;
            }
        };

        let key = record.key;
        let outcome = store
            .insert(record, policy)
            .with_context(|| format!("storing {name}"))?;
        debug!("{name} -> {key}: {outcome}");
        report.tally.record(outcome);
    }

    Ok(report)
}
