//! CRUD operations for [`FileRecord`] rows.

use rusqlite::{params, Connection};

use crate::columns::{not_found, now, opt_ts, ts};
use crate::error::{Result, StoreError};
use crate::models::FileRecord;
use crate::unique::{is_unique, UniqueKey};

const FILE_COLUMNS: &str = "id, submission_id, path, created_at, updated_at, deleted_at";

/// Insert a file row. `path` must already be normalized.
///
/// Fails with [`StoreError::DuplicatePath`] if an undeleted file with the
/// same path exists in the submission.
pub fn insert_file(conn: &Connection, submission_id: i64, path: &str) -> Result<FileRecord> {
    if !is_unique(
        conn,
        UniqueKey::FilePath {
            submission_id,
            path,
        },
    )? {
        return Err(StoreError::DuplicatePath(path.to_string()));
    }

    let (now, stamp) = now();
    conn.execute(
        "INSERT INTO files (submission_id, path, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![submission_id, path, stamp],
    )?;

    Ok(FileRecord {
        id: conn.last_insert_rowid(),
        submission_id,
        path: path.to_string(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Fetch an undeleted file.
pub fn get_file(conn: &Connection, id: i64) -> Result<FileRecord> {
    conn.query_row(
        &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1 AND deleted_at IS NULL"),
        params![id],
        row_to_file,
    )
    .map_err(not_found)
}

/// Undeleted files of a submission, ordered by path.
pub fn files_for_submission(conn: &Connection, submission_id: i64) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files
         WHERE submission_id = ?1 AND deleted_at IS NULL
         ORDER BY path ASC"
    ))?;
    let rows = stmt.query_map(params![submission_id], row_to_file)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

/// Soft-delete every file of a submission together with their comments.
pub fn soft_delete_files_of_submission(conn: &Connection, submission_id: i64) -> Result<usize> {
    let stamp = now().1;
    conn.execute(
        "UPDATE comments SET deleted_at = ?1, updated_at = ?1
         WHERE deleted_at IS NULL
           AND file_id IN (SELECT id FROM files WHERE submission_id = ?2)",
        params![stamp, submission_id],
    )?;
    let affected = conn.execute(
        "UPDATE files SET deleted_at = ?1, updated_at = ?1
         WHERE submission_id = ?2 AND deleted_at IS NULL",
        params![stamp, submission_id],
    )?;
    Ok(affected)
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        path: row.get(2)?,
        created_at: ts(3, row.get(3)?)?,
        updated_at: ts(4, row.get(4)?)?,
        deleted_at: opt_ts(5, row.get(5)?)?,
    })
}
