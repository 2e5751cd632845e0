//! Submissions flagged by reconciliation because their on-disk subtree is
//! missing or damaged beyond what the relational rows can rebuild.

use rusqlite::{params, Connection, OptionalExtension};

use crate::columns::{now, ts};
use crate::error::{Result, StoreError};
use crate::models::ReconcileFlag;

/// Flag a submission. Returns `true` if it was not flagged before.
pub fn flag_submission(conn: &Connection, submission_id: i64, reason: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO reconcile_flags (submission_id, reason, flagged_at)
         VALUES (?1, ?2, ?3)",
        params![submission_id, reason, now().1],
    )?;
    Ok(affected > 0)
}

pub fn clear_flag(conn: &Connection, submission_id: i64) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM reconcile_flags WHERE submission_id = ?1",
        params![submission_id],
    )?;
    Ok(affected > 0)
}

pub fn get_flag(conn: &Connection, submission_id: i64) -> Result<Option<ReconcileFlag>> {
    conn.query_row(
        "SELECT submission_id, reason, flagged_at FROM reconcile_flags WHERE submission_id = ?1",
        params![submission_id],
        row_to_flag,
    )
    .optional()
    .map_err(StoreError::Sqlite)
}

pub fn list_flags(conn: &Connection) -> Result<Vec<ReconcileFlag>> {
    let mut stmt = conn.prepare(
        "SELECT submission_id, reason, flagged_at FROM reconcile_flags ORDER BY submission_id",
    )?;
    let rows = stmt.query_map([], row_to_flag)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

fn row_to_flag(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReconcileFlag> {
    Ok(ReconcileFlag {
        submission_id: row.get(0)?,
        reason: row.get(1)?,
        flagged_at: ts(2, row.get(2)?)?,
    })
}
