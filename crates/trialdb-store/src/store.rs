use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use trialdb_core::{
    merge, BinaryMatrixCodec, ConflictPolicy, ExperimentStore, InsertOutcome, InsertTally,
    KeyValues, MatrixCodec, Record, TrialError, TrialFilter, TrialKey, TrialResult,
};

use crate::schema::init_db;

/// Experiment store backed by a single SQLite file.
///
/// The store owns its connection; it is released by [`SqliteStore::close`]
/// or, failing that, when the store is dropped. One writer per file.
pub struct SqliteStore {
    conn: Connection,
    codec: Box<dyn MatrixCodec>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn new(path: &Path) -> TrialResult<Self> {
        Self::with_codec(path, Box::new(BinaryMatrixCodec))
    }

    /// Open (or create) the store at `path`, encoding matrices with `codec`.
    pub fn with_codec(path: &Path, codec: Box<dyn MatrixCodec>) -> TrialResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrialError::Database(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| TrialError::Database(format!("cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(db_err)?;
        init_db(&conn)?;
        debug!("opened experiment store at {}", path.display());
        Ok(Self {
            conn,
            codec,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> TrialResult<Self> {
        Self::in_memory_with_codec(Box::new(BinaryMatrixCodec))
    }

    pub fn in_memory_with_codec(codec: Box<dyn MatrixCodec>) -> TrialResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrialError::Database(format!("cannot open in-memory db: {e}")))?;
        init_db(&conn)?;
        Ok(Self {
            conn,
            codec,
            path: None,
        })
    }

    /// Backing file, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Release the connection, reporting any error SQLite raises while
    /// flushing. Consumes the store, so it can only run once.
    pub fn close(self) -> TrialResult<()> {
        self.conn
            .close()
            .map_err(|(_, e)| TrialError::Database(format!("cannot close database: {e}")))?;
        if let Some(path) = &self.path {
            debug!("closed experiment store at {}", path.display());
        }
        Ok(())
    }

    /// Delete the store file at `path` together with its WAL companions.
    /// Returns `false` if there was nothing to delete.
    pub fn remove(path: &Path) -> TrialResult<bool> {
        let mut removed = false;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed {
            info!("removed experiment store {}", path.display());
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn db_err(e: rusqlite::Error) -> TrialError {
    TrialError::Database(e.to_string())
}

const SELECT_COLS: &str = "traffic_interval, receive_ratio, unit_size, data_size, samples";

const KEY_MATCH: &str = "traffic_interval = ?1 AND receive_ratio = ?2 \
                         AND unit_size = ?3 AND data_size = ?4";

type RawRow = (TrialKey, Option<Vec<u8>>);

fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
    let key = TrialKey::new(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?);
    Ok((key, row.get(4)?))
}

/// Look up, resolve and write one record on `conn`. Callers wrap this in a
/// transaction so the read and the write commit together.
fn apply_insert(
    conn: &Connection,
    codec: &dyn MatrixCodec,
    record: Record,
    policy: ConflictPolicy,
) -> TrialResult<InsertOutcome> {
    let key = record.key;
    let existing: Option<Option<Vec<u8>>> = conn
        .query_row(
            &format!("SELECT samples FROM trials WHERE {KEY_MATCH}"),
            params![key.traffic_interval, key.receive_ratio, key.unit_size, key.data_size],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;

    let Some(stored) = existing else {
        conn.execute(
            "INSERT INTO trials (traffic_interval, receive_ratio, unit_size, data_size, samples)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.traffic_interval,
                key.receive_ratio,
                key.unit_size,
                key.data_size,
                codec.encode_optional(record.samples.as_ref()),
            ],
        )
        .map_err(db_err)?;
        return Ok(InsertOutcome::Inserted);
    };

    let (outcome, samples) = match policy {
        ConflictPolicy::Ignore => {
            info!("trial {key} already stored, keeping existing samples");
            return Ok(InsertOutcome::Ignored);
        }
        ConflictPolicy::Replace => (InsertOutcome::Replaced, record.samples),
        ConflictPolicy::Merge => {
            let old = codec.decode_optional(stored.as_deref())?;
            (InsertOutcome::Merged, merge(old, record.samples))
        }
    };

    conn.execute(
        &format!("UPDATE trials SET samples = ?5 WHERE {KEY_MATCH}"),
        params![
            key.traffic_interval,
            key.receive_ratio,
            key.unit_size,
            key.data_size,
            codec.encode_optional(samples.as_ref()),
        ],
    )
    .map_err(db_err)?;

    info!("trial {key} already stored, {outcome}");
    Ok(outcome)
}

impl SqliteStore {
    fn select(&self, where_clause: &str, values: &[u32]) -> TrialResult<Vec<Record>> {
        let sql = format!("SELECT {SELECT_COLS} FROM trials{where_clause}");
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;

        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_raw)
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            let (key, blob) = row.map_err(db_err)?;
            let samples = self.codec.decode_optional(blob.as_deref())?;
            results.push(Record::new(key, samples));
        }
        Ok(results)
    }

    fn distinct(&self, column: &str) -> TrialResult<Vec<u32>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT DISTINCT {column} FROM trials ORDER BY {column}"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, u32>(0))
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// ExperimentStore impl
// ---------------------------------------------------------------------------

impl ExperimentStore for SqliteStore {
    fn insert(&self, record: Record, policy: ConflictPolicy) -> TrialResult<InsertOutcome> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let outcome = apply_insert(&tx, self.codec.as_ref(), record, policy)?;
        tx.commit().map_err(db_err)?;
        Ok(outcome)
    }

    fn insert_many(&self, records: Vec<Record>, policy: ConflictPolicy) -> TrialResult<InsertTally> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let mut tally = InsertTally::default();
        for record in records {
            tally.record(apply_insert(&tx, self.codec.as_ref(), record, policy)?);
        }
        tx.commit().map_err(db_err)?;
        debug!(
            "batch insert: {} new, {} conflicts ({policy})",
            tally.inserted,
            tally.conflicts()
        );
        Ok(tally)
    }

    fn get(&self, key: &TrialKey) -> TrialResult<Option<Record>> {
        Ok(self.query(&TrialFilter::exact(*key))?.into_iter().next())
    }

    fn query(&self, filter: &TrialFilter) -> TrialResult<Vec<Record>> {
        let conditions = filter.conditions();
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = conditions
                .iter()
                .enumerate()
                .map(|(i, (col, _))| format!("{col} = ?{}", i + 1))
                .collect();
            format!(" WHERE {}", parts.join(" AND "))
        };
        let values: Vec<u32> = conditions.iter().map(|(_, v)| *v).collect();
        self.select(&where_clause, &values)
    }

    fn distinct_key_values(&self) -> TrialResult<KeyValues> {
        Ok(KeyValues {
            traffic_intervals: self.distinct("traffic_interval")?,
            receive_ratios: self.distinct("receive_ratio")?,
            unit_sizes: self.distinct("unit_size")?,
            data_sizes: self.distinct("data_size")?,
        })
    }

    fn failed_records(&self) -> TrialResult<Vec<Record>> {
        self.select(" WHERE samples IS NULL", &[])
    }

    fn count(&self) -> TrialResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM trials", [], |row| row.get::<_, usize>(0))
            .map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
