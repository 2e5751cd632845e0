use quire_shared::{ApprovalStatus, Capability, GlobalUserId, ValidationError};
use thiserror::Error;

/// Errors produced by the relational and filesystem primitives.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sidecar or metadata JSON could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Path already exists in submission: {0}")]
    DuplicatePath(String),

    #[error("Comment parent {0} is missing, deleted or on another file")]
    BadParent(i64),

    #[error("Unknown user: {0}")]
    UnknownUser(GlobalUserId),

    #[error("User {user} lacks the {capability} capability")]
    MissingCapability {
        user: GlobalUserId,
        capability: Capability,
    },

    #[error("User {0} is still referenced by a submission")]
    Referenced(GlobalUserId),

    #[error("Path escapes the storage root: {0}")]
    PathTraversal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound => true,
            StoreError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by [`crate::Repository`] operations.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Unknown user: {0}")]
    BadUser(String),

    #[error("Insufficient permissions: {0}")]
    WrongPermissions(String),

    #[error("Submission {0} not found")]
    NoSubmission(i64),

    #[error("File {0} not found")]
    NoFile(i64),

    #[error("Comment {0} not found")]
    NoComment(i64),

    #[error("Caller is not a reviewer of this submission")]
    NotReviewer,

    #[error("Reviewer has already reviewed this submission")]
    DuplicateReview,

    #[error("Submission is approved and can no longer change")]
    SubmissionApproved,

    #[error("Submission is rejected and can no longer change")]
    SubmissionRejected,

    #[error("{missing} of {assigned} assigned reviewers have not reviewed yet")]
    MissingReviews { missing: usize, assigned: usize },

    #[error("File already exists: {0}")]
    DuplicateFile(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid parent comment {0}")]
    BadParent(i64),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl JournalError {
    /// The refusal for a mutation against a terminal submission.
    pub fn terminal(status: ApprovalStatus) -> Option<Self> {
        match status {
            ApprovalStatus::Approved => Some(Self::SubmissionApproved),
            ApprovalStatus::Rejected => Some(Self::SubmissionRejected),
            ApprovalStatus::Unset => None,
        }
    }
}

impl From<StoreError> for JournalError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => JournalError::Validation(v),
            StoreError::DuplicateEmail(_) => JournalError::DuplicateEmail,
            StoreError::DuplicatePath(path) => JournalError::DuplicateFile(path),
            StoreError::BadParent(id) => JournalError::BadParent(id),
            StoreError::UnknownUser(id) => JournalError::BadUser(id.to_string()),
            StoreError::MissingCapability { user, capability } => JournalError::WrongPermissions(
                format!("{user} lacks the {capability} capability"),
            ),
            other => JournalError::Store(other),
        }
    }
}

impl From<rusqlite::Error> for JournalError {
    fn from(e: rusqlite::Error) -> Self {
        JournalError::Store(StoreError::Sqlite(e))
    }
}

pub type JournalResult<T> = std::result::Result<T, JournalError>;
