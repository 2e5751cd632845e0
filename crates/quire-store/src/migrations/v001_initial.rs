//! v001 -- Initial schema creation.
//!
//! Users and their global identities, peer servers, submissions with their
//! author/reviewer/category join tables, files and comments. Every table
//! carries `created_at`, `updated_at` and a nullable `deleted_at`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (personal profile)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT NOT NULL COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    phone_number  TEXT,
    organization  TEXT,
    created_at    TEXT NOT NULL,              -- RFC-3339
    updated_at    TEXT NOT NULL,
    deleted_at    TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_active
    ON users(email) WHERE deleted_at IS NULL;

-- ----------------------------------------------------------------
-- Global users (federation identity envelope)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS global_users (
    id           TEXT PRIMARY KEY NOT NULL,   -- <group-number><uuid>
    user_id      INTEGER NOT NULL UNIQUE,     -- FK -> users(id)
    capabilities INTEGER NOT NULL DEFAULT 0,  -- bitmask publisher|reviewer|editor
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    deleted_at   TEXT,

    FOREIGN KEY (user_id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Peer journals
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS servers (
    group_number INTEGER PRIMARY KEY NOT NULL,
    token        TEXT NOT NULL UNIQUE,
    url          TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    deleted_at   TEXT
);

-- ----------------------------------------------------------------
-- Submissions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS submissions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    license    TEXT,
    approval   TEXT NOT NULL DEFAULT 'unset'
               CHECK (approval IN ('unset', 'approved', 'rejected')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS submission_authors (
    submission_id  INTEGER NOT NULL,          -- FK -> submissions(id)
    global_user_id TEXT NOT NULL,             -- FK -> global_users(id)
    position       INTEGER NOT NULL,          -- author order
    created_at     TEXT NOT NULL,

    PRIMARY KEY (submission_id, global_user_id),
    FOREIGN KEY (submission_id) REFERENCES submissions(id),
    FOREIGN KEY (global_user_id) REFERENCES global_users(id)
);

CREATE TABLE IF NOT EXISTS submission_reviewers (
    submission_id  INTEGER NOT NULL,
    global_user_id TEXT NOT NULL,
    created_at     TEXT NOT NULL,

    PRIMARY KEY (submission_id, global_user_id),
    FOREIGN KEY (submission_id) REFERENCES submissions(id),
    FOREIGN KEY (global_user_id) REFERENCES global_users(id)
);

CREATE INDEX IF NOT EXISTS idx_authors_user ON submission_authors(global_user_id);
CREATE INDEX IF NOT EXISTS idx_reviewers_user ON submission_reviewers(global_user_id);

-- ----------------------------------------------------------------
-- Categories
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS categories (
    tag        TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS submission_categories (
    submission_id INTEGER NOT NULL,
    tag           TEXT NOT NULL,

    PRIMARY KEY (submission_id, tag),
    FOREIGN KEY (submission_id) REFERENCES submissions(id),
    FOREIGN KEY (tag) REFERENCES categories(tag)
);

-- ----------------------------------------------------------------
-- Files
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL,           -- FK -> submissions(id)
    path          TEXT NOT NULL,              -- submission-relative, '/'-separated
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    deleted_at    TEXT,

    FOREIGN KEY (submission_id) REFERENCES submissions(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_files_path_active
    ON files(submission_id, path) WHERE deleted_at IS NULL;

-- ----------------------------------------------------------------
-- Comments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS comments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id  TEXT NOT NULL,                 -- FK -> global_users(id)
    file_id    INTEGER NOT NULL,              -- FK -> files(id)
    parent_id  INTEGER,                       -- FK -> comments(id), same file
    body       TEXT NOT NULL,                 -- base64
    start_line INTEGER NOT NULL,
    end_line   INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,

    FOREIGN KEY (author_id) REFERENCES global_users(id),
    FOREIGN KEY (file_id) REFERENCES files(id),
    FOREIGN KEY (parent_id) REFERENCES comments(id)
);

CREATE INDEX IF NOT EXISTS idx_comments_file ON comments(file_id, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
