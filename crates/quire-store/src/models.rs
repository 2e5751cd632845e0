//! Domain model structs persisted in the relational store and the
//! filesystem sidecars.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names so it can be handed directly to the frontend or written to disk.

use chrono::{DateTime, Utc};
use quire_shared::{ApprovalStatus, Capabilities, GlobalUserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Personal profile of a registered user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    /// Stored normalized (trimmed, lowercase); unique among active users.
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub organization: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields required to insert a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub organization: Option<String>,
}

/// Federation identity envelope around a [`User`]. Exactly one per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalUser {
    pub id: GlobalUserId,
    pub user_id: i64,
    pub capabilities: Capabilities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Read projection of a user as it appears on a submission or profile.
///
/// Soft-deleted users keep their ID but their names become `[deleted]` and
/// their contact details are withheld.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: GlobalUserId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub organization: Option<String>,
    pub capabilities: Capabilities,
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// A submission row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub name: String,
    pub license: Option<String>,
    pub approval: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub name: String,
    pub license: Option<String>,
}

/// A submission row with its eagerly loaded associations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub submission: Submission,
    pub files: Vec<FileRecord>,
    /// In author order.
    pub authors: Vec<Person>,
    pub reviewers: Vec<Person>,
    pub categories: Vec<String>,
}

impl SubmissionRecord {
    pub fn has_author(&self, id: &GlobalUserId) -> bool {
        self.authors.iter().any(|p| &p.id == id)
    }

    pub fn has_reviewer(&self, id: &GlobalUserId) -> bool {
        self.reviewers.iter().any(|p| &p.id == id)
    }
}

// ---------------------------------------------------------------------------
// Files & comments
// ---------------------------------------------------------------------------

/// Records the existence and identity of a file. The bytes live on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub submission_id: i64,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A line-anchored comment. Replies carry the ID of their parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub author_id: GlobalUserId,
    pub file_id: i64,
    pub parent_id: Option<i64>,
    /// Base64 body.
    pub body: String,
    pub start_line: i64,
    pub end_line: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: GlobalUserId,
    pub file_id: i64,
    pub parent_id: Option<i64>,
    pub body: String,
    pub start_line: i64,
    pub end_line: i64,
}

/// Per-file JSON document mirrored next to the raw file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sidecar {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

// ---------------------------------------------------------------------------
// Reviews & metadata (disk only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub reviewer_id: GlobalUserId,
    pub approved: bool,
    /// Base64 body.
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Submission metadata stored only on disk next to the sidecar tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionMeta {
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl SubmissionMeta {
    pub fn new(abstract_text: impl Into<String>) -> Self {
        Self {
            abstract_text: abstract_text.into(),
            reviews: Vec::new(),
        }
    }

    pub fn review_by(&self, reviewer: &GlobalUserId) -> Option<&Review> {
        self.reviews.iter().find(|r| &r.reviewer_id == reviewer)
    }
}

// ---------------------------------------------------------------------------
// Categories, peers, reconciliation flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub tag: String,
    pub created_at: DateTime<Utc>,
}

/// A peer journal in the federation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerServer {
    pub group_number: u32,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileFlag {
    pub submission_id: i64,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}
