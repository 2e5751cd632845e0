//! Pairing of a relational transaction with the filesystem writes that
//! belong to it.
//!
//! Filesystem intents are applied while the transaction is still open and
//! each records how to undo itself. If anything fails before the commit
//! lands, the applied intents are undone in reverse order. Intents that
//! destroy data (subtree removal) are deferred until after the commit.
//! Whatever cannot be undone or completed goes to the [`RepairQueue`] for
//! reconciliation to finish.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Transaction;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fs_store::FsStore;
use crate::models::{Comment, SubmissionMeta};

/// A filesystem mutation belonging to a unit of work.
#[derive(Debug, Clone)]
pub enum FsIntent {
    MaterializeSubmission {
        id: i64,
        name: String,
        meta: SubmissionMeta,
    },
    WriteFile {
        id: i64,
        name: String,
        path: String,
        bytes: Vec<u8>,
    },
    AppendComment {
        id: i64,
        name: String,
        path: String,
        comment: Comment,
    },
    ReplaceComment {
        id: i64,
        name: String,
        path: String,
        comment: Comment,
    },
    WriteMeta {
        id: i64,
        name: String,
        meta: SubmissionMeta,
    },
    /// Applied only after the transaction commits.
    RemoveSubmission { id: i64 },
}

/// Work left over for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// The subtree must go: its submission was never committed or was deleted.
    RemoveSubmission { id: i64 },
    /// A raw file was left behind by a rolled-back insert.
    RemoveFile { id: i64, name: String, path: String },
    /// The sidecar of a file may disagree with the comment rows.
    ResyncSidecar { id: i64, file_id: i64 },
    /// The metadata document must be put back to this content.
    RestoreMeta {
        id: i64,
        name: String,
        meta: SubmissionMeta,
    },
}

/// In-memory queue of pending repairs, drained by reconciliation.
#[derive(Debug, Default)]
pub struct RepairQueue {
    pending: Mutex<VecDeque<Repair>>,
}

impl RepairQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Repair>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, repair: Repair) {
        warn!(?repair, "Queued storage repair");
        let mut pending = self.pending();
        if !pending.contains(&repair) {
            pending.push_back(repair);
        }
    }

    pub fn drain(&self) -> Vec<Repair> {
        self.pending().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Undo {
    RemoveSubmission {
        id: i64,
    },
    RemoveFile {
        id: i64,
        name: String,
        path: String,
    },
    RemoveComment {
        id: i64,
        name: String,
        path: String,
        comment: Comment,
    },
    RestoreComment {
        id: i64,
        name: String,
        path: String,
        current: Comment,
        previous: Option<Comment>,
    },
    RestoreMeta {
        id: i64,
        name: String,
        previous: SubmissionMeta,
    },
}

impl Undo {
    fn run(&self, fs: &FsStore) -> Result<()> {
        match self {
            Undo::RemoveSubmission { id } => fs.remove_submission(*id).map(|_| ()),
            Undo::RemoveFile { id, name, path } => fs.remove_file(*id, name, path),
            Undo::RemoveComment {
                id,
                name,
                path,
                comment,
            } => fs.remove_comment(*id, name, path, comment.id).map(|_| ()),
            Undo::RestoreComment {
                id,
                name,
                path,
                current,
                previous,
            } => match previous {
                Some(previous) => fs.replace_comment(*id, name, path, previous).map(|_| ()),
                None => fs.remove_comment(*id, name, path, current.id).map(|_| ()),
            },
            Undo::RestoreMeta { id, name, previous } => fs.write_meta(*id, name, previous),
        }
    }

    fn repair(&self) -> Repair {
        match self {
            Undo::RemoveSubmission { id } => Repair::RemoveSubmission { id: *id },
            Undo::RemoveFile { id, name, path } => Repair::RemoveFile {
                id: *id,
                name: name.clone(),
                path: path.clone(),
            },
            Undo::RemoveComment { id, comment, .. } => Repair::ResyncSidecar {
                id: *id,
                file_id: comment.file_id,
            },
            Undo::RestoreComment { id, current, .. } => Repair::ResyncSidecar {
                id: *id,
                file_id: current.file_id,
            },
            Undo::RestoreMeta { id, name, previous } => Repair::RestoreMeta {
                id: *id,
                name: name.clone(),
                meta: previous.clone(),
            },
        }
    }
}

/// Filesystem side of one relational transaction.
pub struct UnitOfWork<'a> {
    fs: &'a FsStore,
    repairs: &'a RepairQueue,
    applied: Vec<Undo>,
    deferred: Vec<FsIntent>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(fs: &'a FsStore, repairs: &'a RepairQueue) -> Self {
        Self {
            fs,
            repairs,
            applied: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn fs(&self) -> &FsStore {
        self.fs
    }

    /// Apply an intent now, or defer it to after commit if it destroys data.
    pub fn apply(&mut self, intent: FsIntent) -> Result<()> {
        let undo = match intent {
            FsIntent::RemoveSubmission { .. } => {
                self.deferred.push(intent);
                return Ok(());
            }
            FsIntent::MaterializeSubmission { id, name, meta } => {
                // Register the undo first so a half-built tree is cleaned up too.
                self.applied.push(Undo::RemoveSubmission { id });
                self.fs.materialize_submission(id, &name, &meta)?;
                return Ok(());
            }
            FsIntent::WriteFile {
                id,
                name,
                path,
                bytes,
            } => {
                // The raw bytes may land before the sidecar write fails.
                self.applied.push(Undo::RemoveFile {
                    id,
                    name: name.clone(),
                    path: path.clone(),
                });
                self.fs.write_file(id, &name, &path, &bytes)?;
                return Ok(());
            }
            FsIntent::AppendComment {
                id,
                name,
                path,
                comment,
            } => {
                self.fs.append_comment(id, &name, &path, &comment)?;
                Undo::RemoveComment {
                    id,
                    name,
                    path,
                    comment,
                }
            }
            FsIntent::ReplaceComment {
                id,
                name,
                path,
                comment,
            } => {
                let previous = self.fs.replace_comment(id, &name, &path, &comment)?;
                Undo::RestoreComment {
                    id,
                    name,
                    path,
                    current: comment,
                    previous,
                }
            }
            FsIntent::WriteMeta { id, name, meta } => {
                let previous = match self.fs.read_meta(id, &name) {
                    Ok(previous) => previous,
                    Err(e) if e.is_not_found() => SubmissionMeta::default(),
                    Err(e) => return Err(e),
                };
                self.fs.write_meta(id, &name, &meta)?;
                Undo::RestoreMeta { id, name, previous }
            }
        };
        self.applied.push(undo);
        Ok(())
    }

    /// Commit the transaction, then run deferred intents.
    ///
    /// A failed commit undoes every applied intent. A failed deferred intent
    /// is queued for repair; the commit stands.
    pub fn commit(mut self, tx: Transaction<'_>) -> Result<()> {
        if let Err(e) = tx.commit() {
            self.undo_all();
            return Err(e.into());
        }
        self.applied.clear();

        for intent in std::mem::take(&mut self.deferred) {
            if let FsIntent::RemoveSubmission { id } = intent {
                if let Err(e) = self.fs.remove_submission(id) {
                    warn!(submission_id = id, error = %e, "Post-commit removal failed");
                    self.repairs.push(Repair::RemoveSubmission { id });
                }
            }
        }
        Ok(())
    }

    /// Undo every applied intent. The transaction is rolled back by the
    /// caller dropping it.
    pub fn abort(mut self) {
        self.undo_all();
    }

    fn undo_all(&mut self) {
        while let Some(undo) = self.applied.pop() {
            if let Err(e) = undo.run(self.fs) {
                warn!(error = %e, "Failed to undo filesystem write");
                self.repairs.push(undo.repair());
            }
        }
        self.deferred.clear();
        debug!("Filesystem intents undone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tempfile::TempDir;

    fn setup() -> (Database, FsStore, RepairQueue, TempDir) {
        let dir = TempDir::new().unwrap();
        let fs = FsStore::new(dir.path().join("fs")).unwrap();
        (Database::open_in_memory().unwrap(), fs, RepairQueue::new(), dir)
    }

    #[test]
    fn test_abort_undoes_in_reverse() {
        let (mut db, fs, repairs, _dir) = setup();
        let tx = db.transaction().unwrap();
        let mut uow = UnitOfWork::new(&fs, &repairs);
        uow.apply(FsIntent::MaterializeSubmission {
            id: 1,
            name: "demo".into(),
            meta: SubmissionMeta::new("abs"),
        })
        .unwrap();
        uow.apply(FsIntent::WriteFile {
            id: 1,
            name: "demo".into(),
            path: "main.c".into(),
            bytes: b"int main(){}".to_vec(),
        })
        .unwrap();
        assert!(fs.submission_exists(1));

        uow.abort();
        drop(tx);
        assert!(!fs.submission_exists(1));
        assert!(repairs.is_empty());
    }

    #[test]
    fn test_half_written_file_undone() {
        let (mut db, fs, repairs, _dir) = setup();
        // a plain file where the sidecar directory belongs
        let blocker = fs.sidecar_dir(1, "demo");
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"").unwrap();

        let tx = db.transaction().unwrap();
        let mut uow = UnitOfWork::new(&fs, &repairs);
        let result = uow.apply(FsIntent::WriteFile {
            id: 1,
            name: "demo".into(),
            path: "main.c".into(),
            bytes: b"int main(){}".to_vec(),
        });
        assert!(result.is_err());
        assert!(fs.file_exists(1, "demo", "main.c").unwrap());

        std::fs::remove_file(&blocker).unwrap();
        uow.abort();
        drop(tx);
        assert!(!fs.file_exists(1, "demo", "main.c").unwrap());
        assert!(repairs.is_empty());
    }

    #[test]
    fn test_commit_keeps_writes_and_runs_deferred() {
        let (mut db, fs, repairs, _dir) = setup();
        fs.materialize_submission(2, "old", &SubmissionMeta::default()).unwrap();

        let tx = db.transaction().unwrap();
        let mut uow = UnitOfWork::new(&fs, &repairs);
        uow.apply(FsIntent::WriteMeta {
            id: 3,
            name: "demo".into(),
            meta: SubmissionMeta::new("new"),
        })
        .unwrap();
        uow.apply(FsIntent::RemoveSubmission { id: 2 }).unwrap();
        assert!(fs.submission_exists(2));

        uow.commit(tx).unwrap();
        assert!(!fs.submission_exists(2));
        assert_eq!(fs.read_meta(3, "demo").unwrap().abstract_text, "new");
    }

    #[test]
    fn test_meta_restored_on_abort() {
        let (mut db, fs, repairs, _dir) = setup();
        fs.materialize_submission(1, "demo", &SubmissionMeta::new("before")).unwrap();

        let tx = db.transaction().unwrap();
        let mut uow = UnitOfWork::new(&fs, &repairs);
        uow.apply(FsIntent::WriteMeta {
            id: 1,
            name: "demo".into(),
            meta: SubmissionMeta::new("after"),
        })
        .unwrap();
        uow.abort();
        drop(tx);

        assert_eq!(fs.read_meta(1, "demo").unwrap().abstract_text, "before");
    }

    #[test]
    fn test_repair_queue_dedups() {
        let repairs = RepairQueue::new();
        repairs.push(Repair::RemoveSubmission { id: 1 });
        repairs.push(Repair::RemoveSubmission { id: 1 });
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs.drain(), vec![Repair::RemoveSubmission { id: 1 }]);
        assert!(repairs.is_empty());
    }
}
