//! Peer journals of the federation and their bearer tokens.

use rusqlite::{params, Connection, OptionalExtension};

use crate::columns::{not_found, now, ts};
use crate::error::{Result, StoreError};
use crate::models::PeerServer;

/// Register a peer journal, replacing the token and URL of an existing entry.
pub fn upsert_server(conn: &Connection, group_number: u32, token: &str, url: &str) -> Result<PeerServer> {
    let (now, stamp) = now();
    conn.execute(
        "INSERT INTO servers (group_number, token, url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(group_number) DO UPDATE SET
             token = excluded.token,
             url = excluded.url,
             updated_at = excluded.updated_at,
             deleted_at = NULL",
        params![group_number, token, url, stamp],
    )?;
    Ok(PeerServer {
        group_number,
        token: token.to_string(),
        url: url.to_string(),
        created_at: now,
    })
}

pub fn get_server(conn: &Connection, group_number: u32) -> Result<PeerServer> {
    conn.query_row(
        "SELECT group_number, token, url, created_at FROM servers
         WHERE group_number = ?1 AND deleted_at IS NULL",
        params![group_number],
        row_to_server,
    )
    .map_err(not_found)
}

/// Look up the peer owning a security token.
pub fn find_by_token(conn: &Connection, token: &str) -> Result<Option<PeerServer>> {
    conn.query_row(
        "SELECT group_number, token, url, created_at FROM servers
         WHERE token = ?1 AND deleted_at IS NULL",
        params![token],
        row_to_server,
    )
    .optional()
    .map_err(StoreError::Sqlite)
}

pub fn list_servers(conn: &Connection) -> Result<Vec<PeerServer>> {
    let mut stmt = conn.prepare(
        "SELECT group_number, token, url, created_at FROM servers
         WHERE deleted_at IS NULL ORDER BY group_number ASC",
    )?;
    let rows = stmt.query_map([], row_to_server)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

pub fn delete_server(conn: &Connection, group_number: u32) -> Result<bool> {
    let stamp = now().1;
    let affected = conn.execute(
        "UPDATE servers SET deleted_at = ?1, updated_at = ?1
         WHERE group_number = ?2 AND deleted_at IS NULL",
        params![stamp, group_number],
    )?;
    Ok(affected > 0)
}

fn row_to_server(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeerServer> {
    Ok(PeerServer {
        group_number: row.get(0)?,
        token: row.get(1)?,
        url: row.get(2)?,
        created_at: ts(3, row.get(3)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_token_lookup() {
        let db = Database::open_in_memory().unwrap();
        upsert_server(db.conn(), 7, "secret-7", "https://seven.example").unwrap();

        let peer = find_by_token(db.conn(), "secret-7").unwrap().unwrap();
        assert_eq!(peer.group_number, 7);
        assert!(find_by_token(db.conn(), "nope").unwrap().is_none());
    }

    #[test]
    fn test_upsert_rotates_token() {
        let db = Database::open_in_memory().unwrap();
        upsert_server(db.conn(), 7, "old", "https://seven.example").unwrap();
        upsert_server(db.conn(), 7, "new", "https://seven.example").unwrap();

        assert!(find_by_token(db.conn(), "old").unwrap().is_none());
        assert_eq!(get_server(db.conn(), 7).unwrap().token, "new");
        assert_eq!(list_servers(db.conn()).unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let db = Database::open_in_memory().unwrap();
        upsert_server(db.conn(), 7, "t", "https://seven.example").unwrap();
        assert!(delete_server(db.conn(), 7).unwrap());
        assert!(!delete_server(db.conn(), 7).unwrap());
        assert!(matches!(get_server(db.conn(), 7), Err(StoreError::NotFound)));
    }
}
