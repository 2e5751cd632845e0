//! Uniqueness predicates evaluated inside the caller's transaction, so that
//! the check and the following insert cannot interleave with another writer.

use rusqlite::{params, Connection};

use crate::error::Result;

/// A value that must be unique within its scope.
#[derive(Debug, Clone, Copy)]
pub enum UniqueKey<'a> {
    /// Email among active users (case-insensitive).
    Email(&'a str),
    /// Path among the undeleted files of one submission (case-sensitive). A
    /// path also clashes with any file it would nest in or contain.
    FilePath { submission_id: i64, path: &'a str },
}

/// `true` when no active row holds `key`.
pub fn is_unique(conn: &Connection, key: UniqueKey<'_>) -> Result<bool> {
    let count: i64 = match key {
        UniqueKey::Email(email) => conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 COLLATE NOCASE AND deleted_at IS NULL",
            params![email.trim()],
            |row| row.get(0),
        )?,
        UniqueKey::FilePath {
            submission_id,
            path,
        } => conn.query_row(
            "SELECT COUNT(*) FROM files
             WHERE submission_id = ?1 AND deleted_at IS NULL
               AND (path = ?2
                    OR substr(path, 1, length(?2) + 1) = ?2 || '/'
                    OR substr(?2, 1, length(path) + 1) = path || '/')",
            params![submission_id, path],
            |row| row.get(0),
        )?,
    };
    Ok(count == 0)
}
