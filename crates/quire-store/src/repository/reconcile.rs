//! Reconciliation of the relational rows with the filesystem tree.
//!
//! Runs at startup, periodically and on demand. Every step converges, so
//! running it twice in a row leaves the same state as running it once.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use super::Repository;
use crate::comments::comments_for_file;
use crate::error::{JournalResult, Result, StoreError};
use crate::files;
use crate::flags;
use crate::fs_store::FsStore;
use crate::models::{FileRecord, ReconcileFlag, Sidecar};
use crate::submissions;
use crate::unit_of_work::Repair;

pub(crate) const REASON_MISSING_TREE: &str = "submission directory missing";

/// What one reconciliation pass found and did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Live submissions whose tree is missing or damaged.
    pub flagged: Vec<i64>,
    pub rebuilt_sidecars: usize,
    /// Sidecars without a live file row, deleted.
    pub removed_orphans: usize,
    /// On-disk trees without a live submission row, moved aside.
    pub quarantined: Vec<i64>,
    pub stale_temp_files: usize,
    pub repairs_drained: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl Repository {
    pub fn reconcile(&self) -> JournalResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        self.drain_repairs(&mut report);

        let rows = self.read(|conn| Ok(submissions::all_submission_names(conn)?))?;
        let live: HashMap<i64, String> = rows
            .into_iter()
            .filter(|(_, _, deleted)| !deleted)
            .map(|(id, name, _)| (id, name))
            .collect();

        for id in self.fs.list_submission_ids()? {
            if !live.contains_key(&id) {
                self.submission_locks.with(id, || -> JournalResult<()> {
                    let _db = self.db();
                    self.fs.quarantine_submission(id)?;
                    Ok(())
                })?;
                report.quarantined.push(id);
            }
        }

        let mut ids: Vec<&i64> = live.keys().collect();
        ids.sort_unstable();
        for id in ids {
            let name = &live[id];
            self.submission_locks.with(*id, || {
                let db = self.db();
                reconcile_submission(db.conn(), &self.fs, *id, name, &mut report)
            })?;
        }

        if report.is_clean() {
            info!("Reconciliation found nothing to repair");
        } else {
            warn!(
                flagged = report.flagged.len(),
                rebuilt_sidecars = report.rebuilt_sidecars,
                removed_orphans = report.removed_orphans,
                quarantined = report.quarantined.len(),
                stale_temp_files = report.stale_temp_files,
                repairs_drained = report.repairs_drained,
                "Reconciliation repaired divergence"
            );
        }
        Ok(report)
    }

    /// Submissions currently flagged by reconciliation.
    pub fn flagged_submissions(&self) -> JournalResult<Vec<ReconcileFlag>> {
        self.read(|conn| Ok(flags::list_flags(conn)?))
    }

    /// Run queued repairs. Ones that fail again go back on the queue.
    fn drain_repairs(&self, report: &mut ReconcileReport) {
        for repair in self.repairs.drain() {
            let db = self.db();
            match run_repair(db.conn(), &self.fs, &repair) {
                Ok(()) => report.repairs_drained += 1,
                Err(e) => {
                    warn!(?repair, error = %e, "Repair failed, will retry");
                    drop(db);
                    self.repairs.push(repair);
                }
            }
        }
    }
}

fn run_repair(conn: &Connection, fs: &FsStore, repair: &Repair) -> Result<()> {
    match repair {
        Repair::RemoveSubmission { id } => {
            // Only if the submission really is gone.
            match submissions::get_submission(conn, *id) {
                Err(StoreError::NotFound) => fs.remove_submission(*id).map(|_| ()),
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Repair::RemoveFile { id, name, path } => {
            let live = files::files_for_submission(conn, *id)?;
            if live.iter().any(|f| &f.path == path) {
                return Ok(());
            }
            fs.remove_file(*id, name, path)
        }
        Repair::ResyncSidecar { id, file_id } => {
            let submission = match submissions::get_submission(conn, *id) {
                Ok(s) => s,
                Err(StoreError::NotFound) => return Ok(()),
                Err(e) => return Err(e),
            };
            let file = match files::get_file(conn, *file_id) {
                Ok(f) => f,
                Err(StoreError::NotFound) => return Ok(()),
                Err(e) => return Err(e),
            };
            let sidecar = Sidecar {
                comments: comments_for_file(conn, file.id)?,
            };
            fs.write_sidecar(submission.id, &submission.name, &file.path, &sidecar)
        }
        Repair::RestoreMeta { id, name, meta } => fs.write_meta(*id, name, meta),
    }
}

fn reconcile_submission(
    conn: &Connection,
    fs: &FsStore,
    id: i64,
    name: &str,
    report: &mut ReconcileReport,
) -> JournalResult<()> {
    if !fs.submission_exists(id) {
        warn!(submission_id = id, "Submission directory missing");
        flags::flag_submission(conn, id, REASON_MISSING_TREE)?;
        report.flagged.push(id);
        return Ok(());
    }

    report.stale_temp_files += fs.remove_stale_temps(id)?;

    let live_files = files::files_for_submission(conn, id)?;
    let mut problems = Vec::new();

    if let Err(e) = fs.read_meta(id, name) {
        warn!(submission_id = id, error = %e, "Submission metadata unreadable");
        problems.push("metadata missing".to_string());
    }

    let mut missing_bytes = 0;
    for file in &live_files {
        if !fs.file_exists(id, name, &file.path)? {
            warn!(submission_id = id, path = %file.path, "File bytes missing");
            missing_bytes += 1;
        }
        if resync_sidecar(conn, fs, id, name, file)? {
            report.rebuilt_sidecars += 1;
        }
    }
    if missing_bytes > 0 {
        problems.push(format!("{missing_bytes} file(s) missing"));
    }

    let known: HashSet<&str> = live_files.iter().map(|f| f.path.as_str()).collect();
    for path in fs.list_sidecars(id, name)? {
        if !known.contains(path.as_str()) && fs.remove_sidecar(id, name, &path)? {
            warn!(submission_id = id, path = %path, "Removed orphaned sidecar");
            report.removed_orphans += 1;
        }
    }

    if problems.is_empty() {
        if flags::clear_flag(conn, id)? {
            info!(submission_id = id, "Cleared reconciliation flag");
        }
    } else {
        flags::flag_submission(conn, id, &problems.join(", "))?;
        report.flagged.push(id);
    }
    Ok(())
}

/// Rewrite a sidecar when it is missing, unreadable or disagrees with the
/// comment rows. Returns whether it was rewritten.
fn resync_sidecar(
    conn: &Connection,
    fs: &FsStore,
    id: i64,
    name: &str,
    file: &FileRecord,
) -> Result<bool> {
    let expected = Sidecar {
        comments: comments_for_file(conn, file.id)?,
    };
    match fs.read_sidecar(id, name, &file.path) {
        Ok(current) if current == expected => Ok(false),
        Ok(_) | Err(_) => {
            warn!(submission_id = id, path = %file.path, "Rebuilding sidecar from comment rows");
            fs.write_sidecar(id, name, &file.path, &expected)?;
            Ok(true)
        }
    }
}
