//! Reviewer assignment, reviews and the editor decision.
//!
//! Reviews live only in the submission metadata document; every mutation
//! here runs under the per-submission lock so the read-modify-write of that
//! document cannot interleave.

use chrono::Utc;
use quire_shared::validation::decode_base64;
use quire_shared::{ApprovalStatus, GlobalUserId, SubmissionState, ValidationError};
use tracing::info;

use super::{active_user, is_editor, live_submission, refuse_terminal, require_author_or_editor, Repository};
use crate::error::{JournalError, JournalResult};
use crate::models::Review;
use crate::submissions;
use crate::unit_of_work::FsIntent;

impl Repository {
    /// Add reviewers to a submission. Authors and editors may assign; the
    /// new reviewers are merged into the existing set.
    pub fn assign_reviewers(
        &self,
        caller: &GlobalUserId,
        submission_id: i64,
        reviewers: &[GlobalUserId],
    ) -> JournalResult<SubmissionState> {
        if reviewers.is_empty() {
            return Err(ValidationError::Missing { field: "reviewers" }.into());
        }

        self.submission_locks.with(submission_id, || {
            self.write(|tx, _| {
                let submission = live_submission(tx, submission_id)?;
                refuse_terminal(&submission)?;
                require_author_or_editor(tx, caller, submission_id)?;

                let added = submissions::add_reviewers(tx, submission_id, reviewers)?;
                info!(submission_id, added, "Assigned reviewers");
                Ok(())
            })
        })?;
        self.submission_state(submission_id)
    }

    /// Record the caller's review in the metadata document.
    pub fn append_review(
        &self,
        caller: &GlobalUserId,
        submission_id: i64,
        approved: bool,
        body: &str,
    ) -> JournalResult<SubmissionState> {
        decode_base64("body", body)?;

        self.submission_locks.with(submission_id, || {
            self.write(|tx, uow| {
                active_user(tx, caller)?;
                let submission = live_submission(tx, submission_id)?;
                refuse_terminal(&submission)?;
                if !submissions::reviewer_ids(tx, submission_id)?.contains(caller) {
                    return Err(JournalError::NotReviewer);
                }

                let mut meta = uow.fs().read_meta(submission_id, &submission.name)?;
                if meta.review_by(caller).is_some() {
                    return Err(JournalError::DuplicateReview);
                }
                meta.reviews.push(Review {
                    reviewer_id: caller.clone(),
                    approved,
                    body: body.trim().to_string(),
                    created_at: Utc::now(),
                });

                submissions::touch(tx, submission_id)?;
                uow.apply(FsIntent::WriteMeta {
                    id: submission_id,
                    name: submission.name.clone(),
                    meta,
                })?;
                info!(submission_id, reviewer = %caller, approved, "Appended review");
                Ok(())
            })
        })?;
        self.submission_state(submission_id)
    }

    /// Editor decision. Every assigned reviewer must have reviewed. Repeating
    /// the current terminal value succeeds; changing it is refused.
    pub fn set_approval(
        &self,
        caller: &GlobalUserId,
        submission_id: i64,
        approved: bool,
    ) -> JournalResult<ApprovalStatus> {
        let requested = ApprovalStatus::from_decision(approved);

        self.submission_locks.with(submission_id, || {
            self.write(|tx, uow| {
                if !is_editor(tx, caller)? {
                    return Err(JournalError::WrongPermissions(
                        "only an editor may approve or reject".to_string(),
                    ));
                }
                let submission = live_submission(tx, submission_id)?;
                if submission.approval == requested {
                    return Ok(requested);
                }
                refuse_terminal(&submission)?;

                let reviewer_ids = submissions::reviewer_ids(tx, submission_id)?;
                let meta = uow.fs().read_meta(submission_id, &submission.name)?;
                let reviewed = reviewer_ids
                    .iter()
                    .filter(|id| meta.review_by(id).is_some())
                    .count();
                let state = SubmissionState::derive(submission.approval, reviewer_ids.len(), reviewed);
                if !state.accepts_decision() {
                    return Err(JournalError::MissingReviews {
                        missing: reviewer_ids.len() - reviewed,
                        assigned: reviewer_ids.len(),
                    });
                }

                submissions::set_approval(tx, submission_id, requested)?;
                info!(submission_id, editor = %caller, decision = %requested, "Editor decision recorded");
                Ok(requested)
            })
        })
    }

    /// Number of assigned reviewers that have reviewed, and the number
    /// assigned.
    pub fn review_progress(&self, submission_id: i64) -> JournalResult<(usize, usize)> {
        let view = self.get_submission(submission_id)?;
        let reviewed = view
            .reviewers
            .iter()
            .filter(|r| view.reviews.iter().any(|review| review.reviewer_id == r.id))
            .count();
        Ok((reviewed, view.reviewers.len()))
    }
}
