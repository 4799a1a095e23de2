use rusqlite::Connection;
use tracing::debug;

use trialdb_core::TrialError;

/// Columns of the `trials` table, in declaration order.
pub const TRIAL_COLUMNS: [&str; 5] = [
    "traffic_interval",
    "receive_ratio",
    "unit_size",
    "data_size",
    "samples",
];

pub fn init_db(conn: &Connection) -> Result<(), TrialError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS trials (
            traffic_interval INTEGER NOT NULL,
            receive_ratio INTEGER NOT NULL,
            unit_size INTEGER NOT NULL,
            data_size INTEGER NOT NULL,
            samples BLOB, -- NULL for a failed trial
            PRIMARY KEY (traffic_interval, receive_ratio, unit_size, data_size)
        );
        ",
    )
    .map_err(|e| TrialError::Database(e.to_string()))?;

    // A pre-existing table with another layout must not be written to.
    let columns: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT name FROM pragma_table_info('trials') ORDER BY cid")
            .map_err(|e| TrialError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| TrialError::Database(e.to_string()))?;
        rows.collect::<Result<_, _>>()
            .map_err(|e| TrialError::Database(e.to_string()))?
    };

    if columns != TRIAL_COLUMNS {
        return Err(TrialError::Database(format!(
            "schema mismatch: trials has columns [{}], expected [{}]",
            columns.join(", "),
            TRIAL_COLUMNS.join(", ")
        )));
    }

    debug!("trials schema ready");
    Ok(())
}
