//! Comment operations. Rows are written first; the sidecar mirror is
//! updated through the unit of work under the per-file lock.

use quire_shared::validation::{decode_base64, validate_line_range};
use quire_shared::{GlobalUserId, ValidationError};
use tracing::debug;

use super::{active_user, is_editor, live_submission, refuse_terminal, MissingAs, Repository};
use crate::comments as rows;
use crate::error::{JournalError, JournalResult};
use crate::files;
use crate::forest::{build_forest, CommentNode};
use crate::models::{Comment, FileRecord, NewComment, Submission};
use crate::unit_of_work::FsIntent;

#[derive(Debug, Clone)]
pub struct CommentInput {
    /// Base64 body.
    pub body: String,
    pub start_line: i64,
    pub end_line: i64,
    pub parent_id: Option<i64>,
}

/// Number of lines in a text body; a trailing newline does not open a line.
fn line_count(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|b| **b == b'\n').count() as i64;
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

fn validate_body(body: &str) -> JournalResult<()> {
    if decode_base64("body", body)?.is_empty() {
        return Err(ValidationError::Missing { field: "body" }.into());
    }
    Ok(())
}

impl Repository {
    pub fn add_comment(
        &self,
        caller: &GlobalUserId,
        file_id: i64,
        input: CommentInput,
    ) -> JournalResult<Comment> {
        validate_line_range(input.start_line, input.end_line)?;
        validate_body(&input.body)?;

        self.file_locks.with(file_id, || {
            self.write(|tx, uow| {
                let (file, submission) = file_and_submission(tx, file_id)?;
                refuse_terminal(&submission)?;
                active_user(tx, caller)?;

                // Best effort: skipped when the bytes are unavailable.
                if let Ok(bytes) = uow.fs().read_file(submission.id, &submission.name, &file.path) {
                    if input.end_line > line_count(&bytes) {
                        return Err(ValidationError::LineRange {
                            start: input.start_line,
                            end: input.end_line,
                        }
                        .into());
                    }
                }

                let comment = rows::insert_comment(
                    tx,
                    &NewComment {
                        author_id: caller.clone(),
                        file_id,
                        parent_id: input.parent_id,
                        body: input.body.clone(),
                        start_line: input.start_line,
                        end_line: input.end_line,
                    },
                )?;
                uow.apply(FsIntent::AppendComment {
                    id: submission.id,
                    name: submission.name.clone(),
                    path: file.path.clone(),
                    comment: comment.clone(),
                })?;
                debug!(file_id, comment_id = comment.id, "Added comment");
                Ok(comment)
            })
        })
    }

    /// Replace the body of a comment. Only its author may edit it.
    pub fn edit_comment(
        &self,
        caller: &GlobalUserId,
        file_id: i64,
        comment_id: i64,
        body: &str,
    ) -> JournalResult<Comment> {
        validate_body(body)?;

        self.file_locks.with(file_id, || {
            self.write(|tx, uow| {
                let (file, submission) = file_and_submission(tx, file_id)?;
                refuse_terminal(&submission)?;
                active_user(tx, caller)?;

                let existing = comment_on_file(tx, file_id, comment_id)?;
                if existing.deleted_at.is_some() {
                    return Err(JournalError::NoComment(comment_id));
                }
                if &existing.author_id != caller {
                    return Err(JournalError::WrongPermissions(
                        "only the author may edit a comment".to_string(),
                    ));
                }

                let updated = rows::update_comment_body(tx, comment_id, body)
                    .missing_as(|| JournalError::NoComment(comment_id))?;
                uow.apply(FsIntent::ReplaceComment {
                    id: submission.id,
                    name: submission.name.clone(),
                    path: file.path.clone(),
                    comment: updated.clone(),
                })?;
                debug!(file_id, comment_id, "Edited comment");
                Ok(updated)
            })
        })
    }

    /// Tombstone a comment. Its author or an editor may delete it; replies
    /// stay in place. Deleting twice succeeds without change.
    pub fn delete_comment(
        &self,
        caller: &GlobalUserId,
        file_id: i64,
        comment_id: i64,
    ) -> JournalResult<Comment> {
        self.file_locks.with(file_id, || {
            self.write(|tx, uow| {
                let (file, submission) = file_and_submission(tx, file_id)?;
                refuse_terminal(&submission)?;

                let existing = comment_on_file(tx, file_id, comment_id)?;
                if &existing.author_id != caller && !is_editor(tx, caller)? {
                    return Err(JournalError::WrongPermissions(
                        "only the author or an editor may delete a comment".to_string(),
                    ));
                }

                let (tombstone, changed) = rows::soft_delete_comment(tx, comment_id)?;
                if changed {
                    uow.apply(FsIntent::ReplaceComment {
                        id: submission.id,
                        name: submission.name.clone(),
                        path: file.path.clone(),
                        comment: tombstone.clone(),
                    })?;
                    debug!(file_id, comment_id, "Deleted comment");
                }
                Ok(tombstone)
            })
        })
    }

    /// The comment forest of a file.
    pub fn comments(&self, file_id: i64) -> JournalResult<Vec<CommentNode>> {
        self.read(|conn| {
            files::get_file(conn, file_id).missing_as(|| JournalError::NoFile(file_id))?;
            Ok(build_forest(rows::comments_for_file(conn, file_id)?))
        })
    }
}

fn file_and_submission(
    conn: &rusqlite::Connection,
    file_id: i64,
) -> JournalResult<(FileRecord, Submission)> {
    let file = files::get_file(conn, file_id).missing_as(|| JournalError::NoFile(file_id))?;
    let submission = live_submission(conn, file.submission_id)?;
    Ok((file, submission))
}

fn comment_on_file(conn: &rusqlite::Connection, file_id: i64, comment_id: i64) -> JournalResult<Comment> {
    let comment =
        rows::get_comment(conn, comment_id).missing_as(|| JournalError::NoComment(comment_id))?;
    if comment.file_id != file_id {
        return Err(JournalError::NoComment(comment_id));
    }
    Ok(comment)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{demo, fixture, register};
    use super::*;
    use quire_shared::constants::DELETED_COMMENT_BODY;
    use quire_shared::validation::encode_base64;
    use quire_shared::Capability;

    fn input(body: &str, parent_id: Option<i64>) -> CommentInput {
        CommentInput {
            body: encode_base64(body.as_bytes()),
            start_line: 1,
            end_line: 1,
            parent_id,
        }
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(b""), 0);
        assert_eq!(line_count(b"one"), 1);
        assert_eq!(line_count(b"one\n"), 1);
        assert_eq!(line_count(b"one\ntwo"), 2);
    }

    #[test]
    fn test_thread_and_sidecar_mirror() {
        let f = fixture();
        let author = register(&f.repo, "a@example.org", &[Capability::Publisher]);
        let id = f.repo.create_submission(&author, demo(&author, &[])).unwrap();
        let file_id = f.repo.get_submission(id).unwrap().files[0].id;

        let c1 = f.repo.add_comment(&author, file_id, input("first", None)).unwrap();
        let c2 = f.repo.add_comment(&author, file_id, input("second", Some(c1.id))).unwrap();

        let sidecar = f.repo.fs().read_sidecar(id, "demo", "main.c").unwrap();
        assert_eq!(sidecar.comments.len(), 2);
        assert_eq!(sidecar.comments[1].parent_id, Some(c1.id));

        let forest = f.repo.comments(file_id).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].replies[0].comment.id, c2.id);
    }

    #[test]
    fn test_bad_parent_and_line_range() {
        let f = fixture();
        let author = register(&f.repo, "a@example.org", &[Capability::Publisher]);
        let id = f.repo.create_submission(&author, demo(&author, &[])).unwrap();
        let file_id = f.repo.get_submission(id).unwrap().files[0].id;

        assert!(matches!(
            f.repo.add_comment(&author, file_id, input("x", Some(999))),
            Err(JournalError::BadParent(999))
        ));

        let mut past_end = input("x", None);
        past_end.end_line = 5;
        assert!(matches!(
            f.repo.add_comment(&author, file_id, past_end),
            Err(JournalError::Validation(ValidationError::LineRange { .. }))
        ));

        let mut inverted = input("x", None);
        inverted.start_line = 2;
        assert!(matches!(
            f.repo.add_comment(&author, file_id, inverted),
            Err(JournalError::Validation(ValidationError::LineRange { .. }))
        ));
        assert!(f.repo.fs().read_sidecar(id, "demo", "main.c").unwrap().comments.is_empty());
    }

    #[test]
    fn test_edit_only_by_author() {
        let f = fixture();
        let author = register(&f.repo, "a@example.org", &[Capability::Publisher]);
        let other = register(&f.repo, "o@example.org", &[Capability::Editor]);
        let id = f.repo.create_submission(&author, demo(&author, &[])).unwrap();
        let file_id = f.repo.get_submission(id).unwrap().files[0].id;
        let c1 = f.repo.add_comment(&author, file_id, input("draft", None)).unwrap();

        let body = encode_base64(b"final");
        assert!(matches!(
            f.repo.edit_comment(&other, file_id, c1.id, &body),
            Err(JournalError::WrongPermissions(_))
        ));
        let edited = f.repo.edit_comment(&author, file_id, c1.id, &body).unwrap();
        assert_eq!(edited.body, body);
        assert_eq!((edited.start_line, edited.end_line), (1, 1));

        let sidecar = f.repo.fs().read_sidecar(id, "demo", "main.c").unwrap();
        assert_eq!(sidecar.comments[0].body, body);
    }

    #[test]
    fn test_delete_keeps_replies_and_is_idempotent() {
        let f = fixture();
        let author = register(&f.repo, "a@example.org", &[Capability::Publisher]);
        let editor = register(&f.repo, "e@example.org", &[Capability::Editor]);
        let id = f.repo.create_submission(&author, demo(&author, &[])).unwrap();
        let file_id = f.repo.get_submission(id).unwrap().files[0].id;
        let c1 = f.repo.add_comment(&author, file_id, input("root", None)).unwrap();
        let c2 = f.repo.add_comment(&author, file_id, input("reply", Some(c1.id))).unwrap();

        let tombstone = f.repo.delete_comment(&editor, file_id, c1.id).unwrap();
        assert_eq!(tombstone.body, DELETED_COMMENT_BODY);
        f.repo.delete_comment(&editor, file_id, c1.id).unwrap();

        let forest = f.repo.comments(file_id).unwrap();
        assert_eq!(forest[0].comment.body, DELETED_COMMENT_BODY);
        assert_eq!(forest[0].replies[0].comment.id, c2.id);

        let sidecar = f.repo.fs().read_sidecar(id, "demo", "main.c").unwrap();
        assert_eq!(sidecar.comments.len(), 2);
        assert_eq!(sidecar.comments[0].body, DELETED_COMMENT_BODY);

        assert!(matches!(
            f.repo.edit_comment(&author, file_id, c1.id, &encode_base64(b"again")),
            Err(JournalError::NoComment(_))
        ));
    }
}
