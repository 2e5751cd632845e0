//! The submission repository: every operation that has to keep the
//! relational rows and the filesystem tree in step goes through here.
//!
//! Writes run inside [`Repository::write`], which opens a transaction and a
//! [`UnitOfWork`] and commits both or neither. Per-file and per-submission
//! locks are always taken before the database mutex.

mod comments;
mod reconcile;
mod reviews;
mod views;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use quire_shared::constants::MAX_FILE_SIZE;
use quire_shared::validation::{
    normalize_path, paths_overlap, validate_email, validate_person_name, validate_submission_name,
};
use quire_shared::{mint_global_user_id, Capabilities, Capability, GlobalUserId};
use quire_shared::{SubmissionState, ValidationError};
use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::categories;
use crate::database::Database;
use crate::error::{JournalError, JournalResult, StoreError};
use crate::files;
use crate::flags;
use crate::fs_store::FsStore;
use crate::locks::KeyedLocks;
use crate::models::{
    Category, FileRecord, GlobalUser, NewSubmission, NewUser, PeerServer, Person, Submission,
    SubmissionMeta, User,
};
use crate::servers;
use crate::submissions;
use crate::unit_of_work::{FsIntent, RepairQueue, UnitOfWork};
use crate::users;

pub use comments::CommentInput;
pub use reconcile::ReconcileReport;
pub use views::{FileView, SubmissionView};

/// Registration input. The password is hashed by the caller.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub organization: Option<String>,
    pub capabilities: Capabilities,
}

/// A user profile together with its global identity.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub global: GlobalUser,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    /// Submission-relative path, normalized on insert.
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CreateSubmission {
    pub name: String,
    pub license: Option<String>,
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub authors: Vec<GlobalUserId>,
    pub reviewers: Vec<GlobalUserId>,
    pub files: Vec<NewFile>,
}

/// Map [`StoreError::NotFound`] to a more specific journal error.
pub(crate) trait MissingAs<T> {
    fn missing_as(self, err: impl FnOnce() -> JournalError) -> JournalResult<T>;
}

impl<T> MissingAs<T> for crate::error::Result<T> {
    fn missing_as(self, err: impl FnOnce() -> JournalError) -> JournalResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(StoreError::NotFound) => Err(err()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct Repository {
    db: Mutex<Database>,
    fs: FsStore,
    group_number: u32,
    file_locks: KeyedLocks<i64>,
    submission_locks: KeyedLocks<i64>,
    repairs: RepairQueue,
}

impl Repository {
    pub fn new(db: Database, fs: FsStore, group_number: u32) -> Self {
        Self {
            db: Mutex::new(db),
            fs,
            group_number,
            file_locks: KeyedLocks::new(),
            submission_locks: KeyedLocks::new(),
            repairs: RepairQueue::new(),
        }
    }

    /// Open the database file and the filesystem root.
    pub fn open(db_path: &Path, fs_root: &Path, group_number: u32) -> JournalResult<Self> {
        let db = Database::open_at(db_path)?;
        let fs = FsStore::new(fs_root)?;
        info!(group_number, "Repository ready");
        Ok(Self::new(db, fs, group_number))
    }

    pub fn group_number(&self) -> u32 {
        self.group_number
    }

    pub fn fs(&self) -> &FsStore {
        &self.fs
    }

    pub fn pending_repairs(&self) -> usize {
        self.repairs.len()
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> JournalResult<T>) -> JournalResult<T> {
        let db = self.db();
        f(db.conn())
    }

    /// Run `f` in a transaction with a fresh unit of work. Both commit on
    /// `Ok`; on `Err` the filesystem intents are undone and the transaction
    /// rolls back.
    fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>, &mut UnitOfWork<'_>) -> JournalResult<T>,
    ) -> JournalResult<T> {
        let mut db = self.db();
        let tx = db.transaction()?;
        let mut uow = UnitOfWork::new(&self.fs, &self.repairs);
        match f(&tx, &mut uow) {
            Ok(value) => {
                uow.commit(tx)?;
                Ok(value)
            }
            Err(e) => {
                uow.abort();
                drop(tx);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub fn register_user(&self, new: NewAccount) -> JournalResult<Account> {
        validate_email(&new.email)?;
        validate_person_name("firstName", &new.first_name)?;
        validate_person_name("lastName", &new.last_name)?;
        if new.password_hash.is_empty() {
            return Err(ValidationError::Missing { field: "password" }.into());
        }

        let global_id = mint_global_user_id(self.group_number);
        let record = NewUser {
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            phone_number: new.phone_number,
            organization: new.organization,
        };
        let (user, global) = self.write(|tx, _| {
            Ok(users::insert_user(tx, &record, &global_id, new.capabilities)?)
        })?;

        info!(user_id = %global.id, "Registered user");
        Ok(Account { user, global })
    }

    /// Look up an active account by email, for login.
    pub fn find_account(&self, email: &str) -> JournalResult<Account> {
        self.read(|conn| {
            let user = users::get_user_by_email(conn, email)
                .missing_as(|| JournalError::BadUser(email.to_string()))?;
            let global = users::global_user_for_user(conn, user.id)
                .missing_as(|| JournalError::BadUser(email.to_string()))?;
            Ok(Account { user, global })
        })
    }

    pub fn profile(&self, id: &GlobalUserId) -> JournalResult<Person> {
        self.read(|conn| {
            users::get_person(conn, id).missing_as(|| JournalError::BadUser(id.to_string()))
        })
    }

    /// Soft-delete an account. The global identity survives while any
    /// submission still references it and is then shown as `[deleted]`.
    pub fn remove_account(&self, id: &GlobalUserId) -> JournalResult<()> {
        self.write(|tx, _| {
            let caller = active_user(tx, id)?;
            users::soft_delete_user(tx, caller.user_id)?;
            match users::delete_global_user(tx, id) {
                Ok(_) | Err(StoreError::Referenced(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })?;
        info!(user_id = %id, "Removed account");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    /// Create a submission with its files. The caller must be one of the
    /// authors.
    pub fn create_submission(
        &self,
        caller: &GlobalUserId,
        new: CreateSubmission,
    ) -> JournalResult<i64> {
        validate_submission_name(&new.name)?;
        if new.authors.is_empty() {
            return Err(ValidationError::Missing { field: "authors" }.into());
        }
        if !new.authors.contains(caller) {
            return Err(JournalError::WrongPermissions(
                "the creator must be one of the authors".to_string(),
            ));
        }
        let files = prepare_files(new.files)?;
        let name = new.name.trim().to_string();

        let id = self.write(|tx, uow| {
            active_user(tx, caller)?;
            let id = submissions::insert_submission(
                tx,
                &NewSubmission {
                    name: name.clone(),
                    license: new.license.clone(),
                },
                &new.authors,
                &new.reviewers,
                &new.categories,
            )?;
            uow.apply(FsIntent::MaterializeSubmission {
                id,
                name: name.clone(),
                meta: SubmissionMeta::new(new.abstract_text.clone()),
            })?;
            for file in files {
                files::insert_file(tx, id, &file.path)?;
                uow.apply(FsIntent::WriteFile {
                    id,
                    name: name.clone(),
                    path: file.path,
                    bytes: file.bytes,
                })?;
            }
            Ok(id)
        })?;

        info!(submission_id = id, author = %caller, "Created submission");
        Ok(id)
    }

    /// Add one file to an existing submission. Authors and editors only.
    pub fn add_file(
        &self,
        caller: &GlobalUserId,
        submission_id: i64,
        file: NewFile,
    ) -> JournalResult<FileRecord> {
        let mut prepared = prepare_files(vec![file])?;
        let file = prepared.remove(0);

        self.submission_locks.with(submission_id, || {
            self.write(|tx, uow| {
                let submission = live_submission(tx, submission_id)?;
                refuse_terminal(&submission)?;
                require_author_or_editor(tx, caller, submission_id)?;

                let record = files::insert_file(tx, submission_id, &file.path)?;
                uow.apply(FsIntent::WriteFile {
                    id: submission_id,
                    name: submission.name.clone(),
                    path: file.path.clone(),
                    bytes: file.bytes.clone(),
                })?;
                submissions::touch(tx, submission_id)?;
                debug!(submission_id, path = %record.path, "Added file");
                Ok(record)
            })
        })
    }

    /// Full read of a submission. Files whose bytes cannot be loaded come
    /// back as degraded entries.
    pub fn get_submission(&self, id: i64) -> JournalResult<SubmissionView> {
        self.read(|conn| {
            let record = submissions::load_submission(conn, id)
                .missing_as(|| JournalError::NoSubmission(id))?;
            let flag = flags::get_flag(conn, id)?;
            views::submission_view(conn, &self.fs, record, flag)
        })
    }

    pub fn submission_state(&self, id: i64) -> JournalResult<SubmissionState> {
        Ok(self.get_submission(id)?.state)
    }

    /// Soft-delete a submission and remove its tree once the rows are gone.
    /// Deleting an already-deleted submission succeeds without change.
    pub fn delete_submission(&self, caller: &GlobalUserId, id: i64) -> JournalResult<()> {
        self.submission_locks.with(id, || {
            self.write(|tx, uow| {
                let submission = submissions::get_submission_any(tx, id)
                    .missing_as(|| JournalError::NoSubmission(id))?;
                require_author_or_editor(tx, caller, id)?;
                if submission.deleted_at.is_some() {
                    return Ok(());
                }
                submissions::delete_submission(tx, id)?;
                uow.apply(FsIntent::RemoveSubmission { id })?;
                info!(submission_id = id, by = %caller, "Deleted submission");
                Ok(())
            })
        })
    }

    pub fn list_submissions(
        &self,
        tag: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> JournalResult<Vec<Submission>> {
        self.read(|conn| Ok(submissions::list_submissions(conn, tag, limit, offset)?))
    }

    pub fn list_categories(&self) -> JournalResult<Vec<Category>> {
        self.read(|conn| Ok(categories::list_categories(conn)?))
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// One file with its content and comment forest.
    pub fn get_file(&self, file_id: i64) -> JournalResult<FileView> {
        self.read(|conn| {
            let file = files::get_file(conn, file_id).missing_as(|| JournalError::NoFile(file_id))?;
            let submission = live_submission(conn, file.submission_id)?;
            views::file_view(conn, &self.fs, &submission, file)
        })
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    pub fn register_peer(&self, group_number: u32, token: &str, url: &str) -> JournalResult<PeerServer> {
        if token.trim().is_empty() {
            return Err(ValidationError::Missing { field: "token" }.into());
        }
        let peer = self.write(|tx, _| Ok(servers::upsert_server(tx, group_number, token, url)?))?;
        info!(group_number, url, "Registered peer journal");
        Ok(peer)
    }

    /// Resolve a peer security token. A claimed group that does not own the
    /// token fails authentication.
    pub fn authenticate_peer(
        &self,
        token: &str,
        claimed_group: Option<u32>,
    ) -> JournalResult<Option<PeerServer>> {
        let peer = self.read(|conn| Ok(servers::find_by_token(conn, token)?))?;
        Ok(peer.filter(|p| claimed_group.map_or(true, |g| g == p.group_number)))
    }
}

// ----------------------------------------------------------------------
// Helpers shared by the repository modules
// ----------------------------------------------------------------------

/// Normalize paths, enforce the size limit and reject duplicates within
/// the batch, including a path that names a directory of another.
fn prepare_files(files: Vec<NewFile>) -> JournalResult<Vec<NewFile>> {
    let mut out: Vec<NewFile> = Vec::with_capacity(files.len());
    for file in files {
        let path = normalize_path(&file.path)?;
        if file.bytes.len() > MAX_FILE_SIZE {
            return Err(ValidationError::TooLong {
                field: "file",
                max: MAX_FILE_SIZE,
            }
            .into());
        }
        if out.iter().any(|prev| paths_overlap(&prev.path, &path)) {
            return Err(JournalError::DuplicateFile(path));
        }
        out.push(NewFile {
            path,
            bytes: file.bytes,
        });
    }
    Ok(out)
}

/// The caller's global identity, provided both it and the profile are live.
pub(crate) fn active_user(conn: &Connection, id: &GlobalUserId) -> JournalResult<GlobalUser> {
    let global = users::get_global_user(conn, id).missing_as(|| JournalError::BadUser(id.to_string()))?;
    users::get_user(conn, global.user_id).missing_as(|| JournalError::BadUser(id.to_string()))?;
    Ok(global)
}

pub(crate) fn is_editor(conn: &Connection, id: &GlobalUserId) -> JournalResult<bool> {
    Ok(active_user(conn, id)?.capabilities.contains(Capability::Editor))
}

pub(crate) fn live_submission(conn: &Connection, id: i64) -> JournalResult<Submission> {
    submissions::get_submission(conn, id).missing_as(|| JournalError::NoSubmission(id))
}

pub(crate) fn refuse_terminal(submission: &Submission) -> JournalResult<()> {
    match JournalError::terminal(submission.approval) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub(crate) fn require_author_or_editor(
    conn: &Connection,
    caller: &GlobalUserId,
    submission_id: i64,
) -> JournalResult<()> {
    if is_editor(conn, caller)? || submissions::author_ids(conn, submission_id)?.contains(caller) {
        return Ok(());
    }
    Err(JournalError::WrongPermissions(
        "only an author or an editor may do this".to_string(),
    ))
}
