//! Submission rows and their author/reviewer/category associations.

use quire_shared::validation::{validate_submission_name, validate_tag};
use quire_shared::{ApprovalStatus, Capability, GlobalUserId, ValidationError};
use rusqlite::{params, Connection};

use crate::categories::{categories_for_submission, link_categories};
use crate::columns::{approval, global_id, not_found, now, opt_ts, ts};
use crate::error::{Result, StoreError};
use crate::files::{files_for_submission, soft_delete_files_of_submission};
use crate::models::{NewSubmission, Person, Submission, SubmissionRecord};
use crate::users::{get_person, require_capability};

const SUBMISSION_COLUMNS: &str = "id, name, license, approval, created_at, updated_at, deleted_at";

// ------------------------------------------------------------------
// Create
// ------------------------------------------------------------------

/// Create the submission row and all join rows.
///
/// Fails with a validation error when the author list is empty or a tag is
/// malformed, and with a capability error when an author is not a publisher
/// or a reviewer is not a reviewer. Duplicate IDs in either list are
/// collapsed, keeping the first occurrence.
pub fn insert_submission(
    conn: &Connection,
    new: &NewSubmission,
    authors: &[GlobalUserId],
    reviewers: &[GlobalUserId],
    categories: &[String],
) -> Result<i64> {
    validate_submission_name(&new.name)?;
    if authors.is_empty() {
        return Err(ValidationError::Missing { field: "authors" }.into());
    }
    for tag in categories {
        validate_tag(tag)?;
    }

    let authors = dedup(authors);
    let reviewers = dedup(reviewers);
    for author in &authors {
        require_capability(conn, author, Capability::Publisher)?;
    }
    for reviewer in &reviewers {
        require_capability(conn, reviewer, Capability::Reviewer)?;
    }

    let stamp = now().1;
    conn.execute(
        "INSERT INTO submissions (name, license, approval, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![
            new.name.trim(),
            new.license,
            ApprovalStatus::Unset.as_str(),
            stamp,
        ],
    )?;
    let id = conn.last_insert_rowid();

    for (position, author) in authors.iter().enumerate() {
        conn.execute(
            "INSERT INTO submission_authors (submission_id, global_user_id, position, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, author.as_str(), position as i64, stamp],
        )?;
    }
    insert_reviewer_rows(conn, id, &reviewers, &stamp)?;
    link_categories(conn, id, categories)?;

    Ok(id)
}

/// Add reviewers to a submission. Already-assigned reviewers are ignored.
/// Returns the number of newly assigned reviewers.
pub fn add_reviewers(conn: &Connection, id: i64, reviewers: &[GlobalUserId]) -> Result<usize> {
    let reviewers = dedup(reviewers);
    for reviewer in &reviewers {
        require_capability(conn, reviewer, Capability::Reviewer)?;
    }
    let stamp = now().1;
    let added = insert_reviewer_rows(conn, id, &reviewers, &stamp)?;
    touch(conn, id)?;
    Ok(added)
}

fn insert_reviewer_rows(
    conn: &Connection,
    id: i64,
    reviewers: &[GlobalUserId],
    stamp: &str,
) -> Result<usize> {
    let mut added = 0;
    for reviewer in reviewers {
        added += conn.execute(
            "INSERT OR IGNORE INTO submission_reviewers (submission_id, global_user_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![id, reviewer.as_str(), stamp],
        )?;
    }
    Ok(added)
}

fn dedup(ids: &[GlobalUserId]) -> Vec<GlobalUserId> {
    let mut out: Vec<GlobalUserId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

// ------------------------------------------------------------------
// Read
// ------------------------------------------------------------------

/// Fetch a live submission row.
pub fn get_submission(conn: &Connection, id: i64) -> Result<Submission> {
    conn.query_row(
        &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1 AND deleted_at IS NULL"),
        params![id],
        row_to_submission,
    )
    .map_err(not_found)
}

/// Fetch a submission row including soft-deleted ones.
pub fn get_submission_any(conn: &Connection, id: i64) -> Result<Submission> {
    conn.query_row(
        &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1"),
        params![id],
        row_to_submission,
    )
    .map_err(not_found)
}

/// Load a submission with files, authors, reviewers and categories.
/// Comments are not loaded here; they are fetched per file.
pub fn load_submission(conn: &Connection, id: i64) -> Result<SubmissionRecord> {
    let submission = get_submission(conn, id)?;
    let files = files_for_submission(conn, id)?;
    let authors = people(conn, &author_ids(conn, id)?)?;
    let reviewers = people(conn, &reviewer_ids(conn, id)?)?;
    let categories = categories_for_submission(conn, id)?;

    Ok(SubmissionRecord {
        submission,
        files,
        authors,
        reviewers,
        categories,
    })
}

/// Author IDs in author order.
pub fn author_ids(conn: &Connection, id: i64) -> Result<Vec<GlobalUserId>> {
    let mut stmt = conn.prepare(
        "SELECT global_user_id FROM submission_authors WHERE submission_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| global_id(0, row.get(0)?))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

/// Reviewer IDs in assignment order.
pub fn reviewer_ids(conn: &Connection, id: i64) -> Result<Vec<GlobalUserId>> {
    let mut stmt = conn.prepare(
        "SELECT global_user_id FROM submission_reviewers
         WHERE submission_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| global_id(0, row.get(0)?))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

fn people(conn: &Connection, ids: &[GlobalUserId]) -> Result<Vec<Person>> {
    ids.iter().map(|id| get_person(conn, id)).collect()
}

/// Page through live submissions, newest first, optionally by tag.
pub fn list_submissions(
    conn: &Connection,
    tag: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Submission>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.license, s.approval, s.created_at, s.updated_at, s.deleted_at
         FROM submissions s
         WHERE s.deleted_at IS NULL
           AND (?1 IS NULL OR EXISTS (
                SELECT 1 FROM submission_categories c
                WHERE c.submission_id = s.id AND c.tag = ?1))
         ORDER BY s.id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![tag, limit, offset], row_to_submission)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

/// `(id, name, deleted)` of every submission row, deleted ones included.
/// Used by reconciliation to compare against the filesystem.
pub fn all_submission_names(conn: &Connection) -> Result<Vec<(i64, String, bool)>> {
    let mut stmt = conn.prepare("SELECT id, name, deleted_at IS NOT NULL FROM submissions")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

// ------------------------------------------------------------------
// Update / delete
// ------------------------------------------------------------------

pub fn set_approval(conn: &Connection, id: i64, status: ApprovalStatus) -> Result<()> {
    let affected = conn.execute(
        "UPDATE submissions SET approval = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![status.as_str(), now().1, id],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub fn touch(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE submissions SET updated_at = ?1 WHERE id = ?2",
        params![now().1, id],
    )?;
    Ok(())
}

/// Soft-delete a submission and cascade to its files and their comments.
/// Categories and users are untouched. Returns `false` when the submission
/// was already deleted.
pub fn delete_submission(conn: &Connection, id: i64) -> Result<bool> {
    let stamp = now().1;
    let affected = conn.execute(
        "UPDATE submissions SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![stamp, id],
    )?;
    if affected == 0 {
        return Ok(false);
    }
    soft_delete_files_of_submission(conn, id)?;
    Ok(true)
}

fn row_to_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get(0)?,
        name: row.get(1)?,
        license: row.get(2)?,
        approval: approval(3, row.get(3)?)?,
        created_at: ts(4, row.get(4)?)?,
        updated_at: ts(5, row.get(5)?)?,
        deleted_at: opt_ts(6, row.get(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::insert_file;
    use crate::models::NewUser;
    use crate::users::insert_user;
    use crate::Database;
    use quire_shared::{mint_global_user_id, Capabilities};

    fn user(db: &Database, email: &str, caps: &[Capability]) -> GlobalUserId {
        let gid = mint_global_user_id(13);
        let new = NewUser {
            email: email.to_string(),
            password_hash: "x".to_string(),
            first_name: "F".to_string(),
            last_name: "L".to_string(),
            phone_number: None,
            organization: None,
        };
        insert_user(db.conn(), &new, &gid, caps.iter().copied().collect::<Capabilities>()).unwrap();
        gid
    }

    fn demo() -> NewSubmission {
        NewSubmission {
            name: "demo".to_string(),
            license: Some("MIT".to_string()),
        }
    }

    #[test]
    fn test_insert_and_load() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a@example.org", &[Capability::Publisher]);
        let r = user(&db, "r@example.org", &[Capability::Reviewer]);

        let id = insert_submission(
            db.conn(),
            &demo(),
            &[a.clone(), a.clone()],
            &[r.clone()],
            &["c".to_string(), "systems".to_string()],
        )
        .unwrap();
        insert_file(db.conn(), id, "main.c").unwrap();

        let record = load_submission(db.conn(), id).unwrap();
        assert_eq!(record.submission.name, "demo");
        assert_eq!(record.submission.approval, ApprovalStatus::Unset);
        assert_eq!(record.authors.len(), 1);
        assert!(record.has_author(&a));
        assert!(record.has_reviewer(&r));
        assert_eq!(record.categories, vec!["c", "systems"]);
        assert_eq!(record.files.len(), 1);
    }

    #[test]
    fn test_empty_authors_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = insert_submission(db.conn(), &demo(), &[], &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::Missing { field: "authors" })
        ));
    }

    #[test]
    fn test_capabilities_enforced() {
        let db = Database::open_in_memory().unwrap();
        let reviewer_only = user(&db, "r@example.org", &[Capability::Reviewer]);
        let publisher_only = user(&db, "p@example.org", &[Capability::Publisher]);

        assert!(matches!(
            insert_submission(db.conn(), &demo(), &[reviewer_only.clone()], &[], &[]),
            Err(StoreError::MissingCapability { capability: Capability::Publisher, .. })
        ));
        assert!(matches!(
            insert_submission(db.conn(), &demo(), &[publisher_only.clone()], &[publisher_only], &[]),
            Err(StoreError::MissingCapability { capability: Capability::Reviewer, .. })
        ));
    }

    #[test]
    fn test_delete_cascades_and_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a@example.org", &[Capability::Publisher]);
        let id = insert_submission(db.conn(), &demo(), &[a], &[], &[]).unwrap();
        let file = insert_file(db.conn(), id, "main.c").unwrap();

        assert!(delete_submission(db.conn(), id).unwrap());
        assert!(!delete_submission(db.conn(), id).unwrap());
        assert!(matches!(get_submission(db.conn(), id), Err(StoreError::NotFound)));
        assert!(get_submission_any(db.conn(), id).unwrap().deleted_at.is_some());
        assert!(matches!(
            crate::files::get_file(db.conn(), file.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_list_by_tag() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a@example.org", &[Capability::Publisher]);
        insert_submission(db.conn(), &demo(), &[a.clone()], &[], &["rust".to_string()]).unwrap();
        insert_submission(db.conn(), &demo(), &[a], &[], &[]).unwrap();

        assert_eq!(list_submissions(db.conn(), None, 10, 0).unwrap().len(), 2);
        assert_eq!(list_submissions(db.conn(), Some("rust"), 10, 0).unwrap().len(), 1);
    }
}
