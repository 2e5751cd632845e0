//! CRUD operations for [`User`] and [`GlobalUser`] records.

use quire_shared::constants::DELETED_USER_NAME;
use quire_shared::validation::normalize_email;
use quire_shared::{Capabilities, Capability, GlobalUserId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::columns::{global_id, not_found, now, opt_ts, ts};
use crate::error::{Result, StoreError};
use crate::models::{GlobalUser, NewUser, Person, User};
use crate::unique::{is_unique, UniqueKey};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone_number,
     organization, created_at, updated_at, deleted_at";

const GLOBAL_USER_COLUMNS: &str = "id, user_id, capabilities, created_at, updated_at, deleted_at";

// ------------------------------------------------------------------
// Create
// ------------------------------------------------------------------

/// Insert a user and its global identity.
///
/// Email uniqueness is checked on the same connection (normally inside the
/// registration transaction) before the insert.
pub fn insert_user(
    conn: &Connection,
    new: &NewUser,
    global_id: &GlobalUserId,
    capabilities: Capabilities,
) -> Result<(User, GlobalUser)> {
    let email = normalize_email(&new.email);
    if !is_unique(conn, UniqueKey::Email(&email))? {
        return Err(StoreError::DuplicateEmail(email));
    }

    let (now, stamp) = now();
    conn.execute(
        "INSERT INTO users (email, password_hash, first_name, last_name, phone_number,
                            organization, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            email,
            new.password_hash,
            new.first_name.trim(),
            new.last_name.trim(),
            new.phone_number,
            new.organization,
            stamp,
        ],
    )?;
    let user_id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO global_users (id, user_id, capabilities, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![global_id.as_str(), user_id, capabilities.bits(), stamp],
    )?;

    let user = User {
        id: user_id,
        email,
        password_hash: new.password_hash.clone(),
        first_name: new.first_name.trim().to_string(),
        last_name: new.last_name.trim().to_string(),
        phone_number: new.phone_number.clone(),
        organization: new.organization.clone(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let global = GlobalUser {
        id: global_id.clone(),
        user_id,
        capabilities,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    Ok((user, global))
}

// ------------------------------------------------------------------
// Read
// ------------------------------------------------------------------

/// Fetch an active user by row ID.
pub fn get_user(conn: &Connection, id: i64) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND deleted_at IS NULL"),
        params![id],
        row_to_user,
    )
    .map_err(not_found)
}

/// Fetch an active user by email (case-insensitive).
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<User> {
    conn.query_row(
        &format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE email = ?1 COLLATE NOCASE AND deleted_at IS NULL"
        ),
        params![normalize_email(email)],
        row_to_user,
    )
    .map_err(not_found)
}

/// Fetch an active global user.
pub fn get_global_user(conn: &Connection, id: &GlobalUserId) -> Result<GlobalUser> {
    conn.query_row(
        &format!(
            "SELECT {GLOBAL_USER_COLUMNS} FROM global_users WHERE id = ?1 AND deleted_at IS NULL"
        ),
        params![id.as_str()],
        row_to_global_user,
    )
    .map_err(not_found)
}

/// The global identity of a user row.
pub fn global_user_for_user(conn: &Connection, user_id: i64) -> Result<GlobalUser> {
    conn.query_row(
        &format!(
            "SELECT {GLOBAL_USER_COLUMNS} FROM global_users
             WHERE user_id = ?1 AND deleted_at IS NULL"
        ),
        params![user_id],
        row_to_global_user,
    )
    .map_err(not_found)
}

/// Fetch a global user whose profile is also live and require a capability.
pub fn require_capability(
    conn: &Connection,
    id: &GlobalUserId,
    capability: Capability,
) -> Result<GlobalUser> {
    let user = conn
        .query_row(
            "SELECT g.id, g.user_id, g.capabilities, g.created_at, g.updated_at, g.deleted_at
             FROM global_users g JOIN users u ON u.id = g.user_id
             WHERE g.id = ?1 AND g.deleted_at IS NULL AND u.deleted_at IS NULL",
            params![id.as_str()],
            row_to_global_user,
        )
        .optional()?
        .ok_or_else(|| StoreError::UnknownUser(id.clone()))?;
    if !user.capabilities.contains(capability) {
        return Err(StoreError::MissingCapability {
            user: id.clone(),
            capability,
        });
    }
    Ok(user)
}

/// Project a global user for display, including soft-deleted ones.
pub fn get_person(conn: &Connection, id: &GlobalUserId) -> Result<Person> {
    conn.query_row(
        "SELECT g.id, g.capabilities, g.deleted_at, u.first_name, u.last_name, u.email,
                u.phone_number, u.organization, u.deleted_at
         FROM global_users g JOIN users u ON u.id = g.user_id
         WHERE g.id = ?1",
        params![id.as_str()],
        row_to_person,
    )
    .map_err(not_found)
}

// ------------------------------------------------------------------
// Update / delete
// ------------------------------------------------------------------

/// Whether any live submission lists this user as author or reviewer.
pub fn is_referenced(conn: &Connection, id: &GlobalUserId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM submission_authors a
                 JOIN submissions s ON s.id = a.submission_id AND s.deleted_at IS NULL
             WHERE a.global_user_id = ?1
             UNION ALL
             SELECT 1 FROM submission_reviewers r
                 JOIN submissions s ON s.id = r.submission_id AND s.deleted_at IS NULL
             WHERE r.global_user_id = ?1
             LIMIT 1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Soft-delete a user profile. Already-deleted users are left untouched.
pub fn soft_delete_user(conn: &Connection, user_id: i64) -> Result<bool> {
    let stamp = now().1;
    let affected = conn.execute(
        "UPDATE users SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![stamp, user_id],
    )?;
    Ok(affected > 0)
}

/// Soft-delete a global identity. Refused while a submission references it.
pub fn delete_global_user(conn: &Connection, id: &GlobalUserId) -> Result<bool> {
    if is_referenced(conn, id)? {
        return Err(StoreError::Referenced(id.clone()));
    }
    let stamp = now().1;
    let affected = conn.execute(
        "UPDATE global_users SET deleted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND deleted_at IS NULL",
        params![stamp, id.as_str()],
    )?;
    Ok(affected > 0)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone_number: row.get(5)?,
        organization: row.get(6)?,
        created_at: ts(7, row.get(7)?)?,
        updated_at: ts(8, row.get(8)?)?,
        deleted_at: opt_ts(9, row.get(9)?)?,
    })
}

fn row_to_global_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<GlobalUser> {
    Ok(GlobalUser {
        id: global_id(0, row.get(0)?)?,
        user_id: row.get(1)?,
        capabilities: Capabilities::from_bits(row.get(2)?),
        created_at: ts(3, row.get(3)?)?,
        updated_at: ts(4, row.get(4)?)?,
        deleted_at: opt_ts(5, row.get(5)?)?,
    })
}

fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    let global_deleted: Option<String> = row.get(2)?;
    let user_deleted: Option<String> = row.get(8)?;
    let deleted = global_deleted.is_some() || user_deleted.is_some();
    let capabilities = Capabilities::from_bits(row.get(1)?);
    let id = global_id(0, row.get(0)?)?;

    if deleted {
        return Ok(Person {
            id,
            first_name: DELETED_USER_NAME.to_string(),
            last_name: DELETED_USER_NAME.to_string(),
            email: None,
            phone_number: None,
            organization: None,
            capabilities,
            deleted,
        });
    }

    Ok(Person {
        id,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone_number: row.get(6)?,
        organization: row.get(7)?,
        capabilities,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use quire_shared::mint_global_user_id;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone_number: None,
            organization: Some("Analytical Engines".to_string()),
        }
    }

    #[test]
    fn test_insert_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let gid = mint_global_user_id(13);
        let caps = Capabilities::NONE.with(Capability::Publisher);
        let (user, global) = insert_user(db.conn(), &new_user("Ada@Example.org"), &gid, caps).unwrap();

        assert_eq!(user.email, "ada@example.org");
        assert_eq!(get_user(db.conn(), user.id).unwrap(), user);
        assert_eq!(get_user_by_email(db.conn(), "ADA@example.org").unwrap().id, user.id);
        assert_eq!(get_global_user(db.conn(), &gid).unwrap(), global);
        assert_eq!(global_user_for_user(db.conn(), user.id).unwrap().id, gid);
    }

    #[test]
    fn test_duplicate_email_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        insert_user(db.conn(), &new_user("ada@example.org"), &mint_global_user_id(13), Capabilities::NONE).unwrap();

        let err = insert_user(
            db.conn(),
            &new_user("ADA@example.org"),
            &mint_global_user_id(13),
            Capabilities::NONE,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail(_)));
    }

    #[test]
    fn test_email_reusable_after_soft_delete() {
        let db = Database::open_in_memory().unwrap();
        let (user, _) = insert_user(db.conn(), &new_user("ada@example.org"), &mint_global_user_id(13), Capabilities::NONE).unwrap();

        assert!(soft_delete_user(db.conn(), user.id).unwrap());
        // idempotent
        assert!(!soft_delete_user(db.conn(), user.id).unwrap());
        assert!(insert_user(db.conn(), &new_user("ada@example.org"), &mint_global_user_id(13), Capabilities::NONE).is_ok());
    }

    #[test]
    fn test_require_capability() {
        let db = Database::open_in_memory().unwrap();
        let gid = mint_global_user_id(13);
        insert_user(db.conn(), &new_user("r@example.org"), &gid, Capabilities::NONE.with(Capability::Reviewer)).unwrap();

        assert!(require_capability(db.conn(), &gid, Capability::Reviewer).is_ok());
        assert!(matches!(
            require_capability(db.conn(), &gid, Capability::Publisher),
            Err(StoreError::MissingCapability { .. })
        ));
        assert!(matches!(
            require_capability(db.conn(), &mint_global_user_id(13), Capability::Reviewer),
            Err(StoreError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_require_capability_rejects_deleted_profile() {
        let db = Database::open_in_memory().unwrap();
        let gid = mint_global_user_id(13);
        let caps = Capabilities::NONE.with(Capability::Reviewer);
        let (user, _) = insert_user(db.conn(), &new_user("r@example.org"), &gid, caps).unwrap();

        soft_delete_user(db.conn(), user.id).unwrap();
        // the global row is still live, the profile is not
        assert!(get_global_user(db.conn(), &gid).is_ok());
        assert!(matches!(
            require_capability(db.conn(), &gid, Capability::Reviewer),
            Err(StoreError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_deleted_person_projection() {
        let db = Database::open_in_memory().unwrap();
        let gid = mint_global_user_id(13);
        let (user, _) = insert_user(db.conn(), &new_user("ada@example.org"), &gid, Capabilities::NONE).unwrap();

        assert_eq!(get_person(db.conn(), &gid).unwrap().first_name, "Ada");
        soft_delete_user(db.conn(), user.id).unwrap();

        let person = get_person(db.conn(), &gid).unwrap();
        assert!(person.deleted);
        assert_eq!(person.first_name, DELETED_USER_NAME);
        assert_eq!(person.email, None);
    }
}
