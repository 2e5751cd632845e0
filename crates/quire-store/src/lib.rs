//! # quire-store
//!
//! Persistence for the journal: a SQLite relational store for users,
//! submissions, files and comments, plus a filesystem tree holding raw file
//! bytes, per-file comment sidecars and per-submission metadata.
//!
//! The free functions in the table modules take a `&Connection` so they can
//! run inside a transaction. [`Repository`] composes them with the
//! filesystem store and is the entry point the server uses.

pub mod categories;
pub mod comments;
pub mod database;
pub mod files;
pub mod flags;
pub mod forest;
pub mod fs_store;
pub mod locks;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod servers;
pub mod submissions;
pub mod unique;
pub mod unit_of_work;
pub mod users;

mod columns;
mod error;

pub use database::Database;
pub use error::{JournalError, JournalResult, Result, StoreError};
pub use forest::{build_forest, CommentNode};
pub use fs_store::FsStore;
pub use models::*;
pub use repository::{
    Account, CommentInput, CreateSubmission, FileView, NewAccount, NewFile, ReconcileReport,
    Repository, SubmissionView,
};
