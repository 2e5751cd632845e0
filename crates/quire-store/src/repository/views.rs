//! Read projections returned by the repository.

use chrono::{DateTime, Utc};
use quire_shared::validation::encode_base64;
use quire_shared::{ApprovalStatus, SubmissionState};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::comments::comments_for_file;
use crate::error::JournalResult;
use crate::forest::{build_forest, CommentNode};
use crate::fs_store::FsStore;
use crate::models::{FileRecord, Person, ReconcileFlag, Review, Submission, SubmissionMeta, SubmissionRecord};

/// A file with its base64 content and comment forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: i64,
    pub submission_id: i64,
    pub path: String,
    /// Base64 bytes; absent when the file could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub degraded: bool,
    pub comments: Vec<CommentNode>,
}

/// Everything known about a submission, merged from both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: i64,
    pub name: String,
    pub license: Option<String>,
    pub approval: ApprovalStatus,
    pub state: SubmissionState,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<Person>,
    pub reviewers: Vec<Person>,
    pub categories: Vec<String>,
    pub reviews: Vec<Review>,
    pub files: Vec<FileView>,
    /// Set when the metadata document could not be read.
    pub meta_degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<ReconcileFlag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Count reviews written by currently assigned reviewers.
pub(crate) fn reviews_by_assigned(meta: &SubmissionMeta, reviewers: &[Person]) -> usize {
    reviewers
        .iter()
        .filter(|r| meta.review_by(&r.id).is_some())
        .count()
}

pub(crate) fn submission_view(
    conn: &Connection,
    fs: &FsStore,
    record: SubmissionRecord,
    flag: Option<ReconcileFlag>,
) -> JournalResult<SubmissionView> {
    let SubmissionRecord {
        submission,
        files,
        authors,
        reviewers,
        categories,
    } = record;

    let (meta, meta_degraded) = match fs.read_meta(submission.id, &submission.name) {
        Ok(meta) => (meta, false),
        Err(e) => {
            warn!(submission_id = submission.id, error = %e, "Submission metadata unreadable");
            (SubmissionMeta::default(), true)
        }
    };

    let state = SubmissionState::derive(
        submission.approval,
        reviewers.len(),
        reviews_by_assigned(&meta, &reviewers),
    );

    let files = files
        .into_iter()
        .map(|file| file_view(conn, fs, &submission, file))
        .collect::<JournalResult<Vec<_>>>()?;

    Ok(SubmissionView {
        id: submission.id,
        name: submission.name,
        license: submission.license,
        approval: submission.approval,
        state,
        abstract_text: meta.abstract_text,
        authors,
        reviewers,
        categories,
        reviews: meta.reviews,
        files,
        meta_degraded,
        flag,
        created_at: submission.created_at,
        updated_at: submission.updated_at,
    })
}

pub(crate) fn file_view(
    conn: &Connection,
    fs: &FsStore,
    submission: &Submission,
    file: FileRecord,
) -> JournalResult<FileView> {
    let content = match fs.read_file(submission.id, &submission.name, &file.path) {
        Ok(bytes) => Some(encode_base64(&bytes)),
        Err(e) => {
            warn!(file_id = file.id, path = %file.path, error = %e, "File bytes unreadable");
            None
        }
    };
    let comments = build_forest(comments_for_file(conn, file.id)?);

    Ok(FileView {
        id: file.id,
        submission_id: file.submission_id,
        path: file.path,
        degraded: content.is_none(),
        content,
        comments,
    })
}
