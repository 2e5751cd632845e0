use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Submissions whose on-disk subtree reconciliation could not rebuild
CREATE TABLE IF NOT EXISTS reconcile_flags (
    submission_id INTEGER PRIMARY KEY NOT NULL,   -- FK -> submissions(id)
    reason        TEXT NOT NULL,
    flagged_at    TEXT NOT NULL,

    FOREIGN KEY (submission_id) REFERENCES submissions(id)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
