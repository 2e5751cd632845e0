//! Tag vocabulary attached to submissions. Tags are created lazily on first
//! use and never implicitly deleted.

use quire_shared::validation::validate_tag;
use rusqlite::{params, Connection};

use crate::columns::{now, ts};
use crate::error::{Result, StoreError};
use crate::models::Category;

/// Create the tag if it does not exist yet.
pub fn ensure_category(conn: &Connection, tag: &str) -> Result<()> {
    validate_tag(tag)?;
    let stamp = now().1;
    conn.execute(
        "INSERT OR IGNORE INTO categories (tag, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![tag, stamp],
    )?;
    Ok(())
}

/// Attach tags to a submission, creating unknown tags on the way.
pub fn link_categories(conn: &Connection, submission_id: i64, tags: &[String]) -> Result<()> {
    for tag in tags {
        ensure_category(conn, tag)?;
        conn.execute(
            "INSERT OR IGNORE INTO submission_categories (submission_id, tag) VALUES (?1, ?2)",
            params![submission_id, tag],
        )?;
    }
    Ok(())
}

pub fn categories_for_submission(conn: &Connection, submission_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT tag FROM submission_categories WHERE submission_id = ?1 ORDER BY tag ASC",
    )?;
    let rows = stmt.query_map(params![submission_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<String>, _>>()
        .map_err(StoreError::Sqlite)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT tag, created_at FROM categories WHERE deleted_at IS NULL ORDER BY tag ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            tag: row.get(0)?,
            created_at: ts(1, row.get(1)?)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}
