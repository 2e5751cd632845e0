//! Comment rows. The relational store is the authority for comments; the
//! per-file sidecar is a mirror derived from these rows.
//!
//! Comments are append-only: insertion never rewrites earlier rows, edits
//! replace the body only, and deletion is a tombstone that keeps replies
//! visible.

use quire_shared::constants::DELETED_COMMENT_BODY;
use rusqlite::{params, Connection};

use crate::columns::{global_id, not_found, now, opt_ts, ts};
use crate::error::{Result, StoreError};
use crate::models::{Comment, NewComment};

const COMMENT_COLUMNS: &str =
    "id, author_id, file_id, parent_id, body, start_line, end_line, created_at, updated_at, deleted_at";

/// Insert a comment.
///
/// Fails with [`StoreError::BadParent`] when `parent_id` does not resolve,
/// is tombstoned, or belongs to another file.
pub fn insert_comment(conn: &Connection, new: &NewComment) -> Result<Comment> {
    if let Some(parent_id) = new.parent_id {
        match get_comment(conn, parent_id) {
            Ok(parent) if parent.file_id == new.file_id && parent.deleted_at.is_none() => {}
            Ok(_) | Err(StoreError::NotFound) => return Err(StoreError::BadParent(parent_id)),
            Err(other) => return Err(other),
        }
    }

    let (now, stamp) = now();
    conn.execute(
        "INSERT INTO comments (author_id, file_id, parent_id, body, start_line, end_line,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            new.author_id.as_str(),
            new.file_id,
            new.parent_id,
            new.body,
            new.start_line,
            new.end_line,
            stamp,
        ],
    )?;

    Ok(Comment {
        id: conn.last_insert_rowid(),
        author_id: new.author_id.clone(),
        file_id: new.file_id,
        parent_id: new.parent_id,
        body: new.body.clone(),
        start_line: new.start_line,
        end_line: new.end_line,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Fetch a comment, tombstoned or not, with its stored body.
pub fn get_comment(conn: &Connection, id: i64) -> Result<Comment> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
        params![id],
        row_to_comment,
    )
    .map_err(not_found)
}

/// All comments on a file in insertion order. Tombstoned comments are kept
/// so their replies stay attached, but their body is the deleted sentinel.
pub fn comments_for_file(conn: &Connection, file_id: i64) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE file_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![file_id], row_to_comment)?;
    rows.map(|r| r.map(project_deleted))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

/// Replace the body of a live comment. Returns the updated comment.
pub fn update_comment_body(conn: &Connection, id: i64, body: &str) -> Result<Comment> {
    let stamp = now().1;
    let affected = conn.execute(
        "UPDATE comments SET body = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![body, stamp, id],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    get_comment(conn, id)
}

/// Tombstone a comment. Returns the projected comment and whether a row
/// changed; tombstoning twice is a no-op.
pub fn soft_delete_comment(conn: &Connection, id: i64) -> Result<(Comment, bool)> {
    let stamp = now().1;
    let affected = conn.execute(
        "UPDATE comments SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![stamp, id],
    )?;
    let comment = project_deleted(get_comment(conn, id)?);
    Ok((comment, affected > 0))
}

/// Replace the body of a tombstoned comment with the sentinel.
pub fn project_deleted(mut comment: Comment) -> Comment {
    if comment.deleted_at.is_some() {
        comment.body = DELETED_COMMENT_BODY.to_string();
    }
    comment
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        author_id: global_id(1, row.get(1)?)?,
        file_id: row.get(2)?,
        parent_id: row.get(3)?,
        body: row.get(4)?,
        start_line: row.get(5)?,
        end_line: row.get(6)?,
        created_at: ts(7, row.get(7)?)?,
        updated_at: ts(8, row.get(8)?)?,
        deleted_at: opt_ts(9, row.get(9)?)?,
    })
}
