//! On-disk layout for submissions.
//!
//! ```text
//! <root>/<id>/<disk_name>/<path>               raw file bytes
//! <root>/<id>/.data/<disk_name>/<path>.json    per-file comment sidecar
//! <root>/<id>/.data/<disk_name>.json           submission metadata
//! <root>/.quarantine/<id>-<timestamp>/         orphaned subtrees
//! ```
//!
//! Every write goes to a temporary file in the target directory and is then
//! renamed over the destination, so readers never observe a half-written
//! document.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use quire_shared::constants::{DATA_DIR_NAME, QUARANTINE_DIR_NAME, TEMP_FILE_MARKER};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Result, StoreError};
use crate::models::{Comment, Sidecar, SubmissionMeta};

const SIDECAR_EXT: &str = ".json";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Resolve a `/`-separated relative path under `base`, refusing anything
/// that would leave it.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::PathTraversal(relative.to_string()));
            }
        }
    }
    if resolved == base || !resolved.starts_with(base) {
        return Err(StoreError::PathTraversal(relative.to_string()));
    }
    Ok(resolved)
}

/// Directory-safe form of a submission name: path separators and control
/// characters become `_`, and a leading `.` is escaped so the directory can
/// never collide with `.data` or become hidden.
pub fn disk_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with('.') {
        out.insert(0, '_');
    }
    out
}

fn create_dir_all(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path)?;
    Ok(())
}

/// Write `bytes` to `target` via a sibling temp file and a rename.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| StoreError::PathTraversal(target.display().to_string()))?;
    create_dir_all(parent)?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!("{file_name}{TEMP_FILE_MARKER}{}", Uuid::new_v4().simple()));

    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(FILE_MODE))?;
        }
        fs::rename(&tmp, target)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// Whether `name` has exactly the shape [`write_atomic`] gives its temp
/// files: the target name, the marker, then a 32-digit lowercase hex UUID.
fn is_temp_name(name: &str) -> bool {
    let Some((target, suffix)) = name.rsplit_once(TEMP_FILE_MARKER) else {
        return false;
    };
    !target.is_empty()
        && suffix.len() == 32
        && suffix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn write_json<T: Serialize>(target: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(target, &bytes)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Filesystem half of the journal's storage.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) the storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        create_dir_all(&root)?;
        info!(path = %root.display(), "Submission storage initialized");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    pub fn submission_dir(&self, id: i64) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn files_dir(&self, id: i64, name: &str) -> PathBuf {
        self.submission_dir(id).join(disk_name(name))
    }

    pub fn data_dir(&self, id: i64) -> PathBuf {
        self.submission_dir(id).join(DATA_DIR_NAME)
    }

    pub fn sidecar_dir(&self, id: i64, name: &str) -> PathBuf {
        self.data_dir(id).join(disk_name(name))
    }

    pub fn meta_path(&self, id: i64, name: &str) -> PathBuf {
        self.data_dir(id)
            .join(format!("{}{SIDECAR_EXT}", disk_name(name)))
    }

    pub fn file_path(&self, id: i64, name: &str, path: &str) -> Result<PathBuf> {
        ensure_within(&self.files_dir(id, name), path)
    }

    /// Sidecar for `path`: the file name keeps its extension and gains
    /// `.json`, so `main.c` and `main.h` get distinct sidecars.
    pub fn sidecar_path(&self, id: i64, name: &str, path: &str) -> Result<PathBuf> {
        ensure_within(&self.sidecar_dir(id, name), &format!("{path}{SIDECAR_EXT}"))
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    /// Create the submission tree and write its metadata document.
    pub fn materialize_submission(&self, id: i64, name: &str, meta: &SubmissionMeta) -> Result<()> {
        create_dir_all(&self.files_dir(id, name))?;
        create_dir_all(&self.sidecar_dir(id, name))?;
        write_json(&self.meta_path(id, name), meta)?;
        debug!(submission = id, "Materialized submission tree");
        Ok(())
    }

    pub fn submission_exists(&self, id: i64) -> bool {
        self.submission_dir(id).is_dir()
    }

    /// Remove a submission subtree. Missing trees are not an error.
    pub fn remove_submission(&self, id: i64) -> Result<bool> {
        match fs::remove_dir_all(self.submission_dir(id)) {
            Ok(()) => {
                debug!(submission = id, "Removed submission tree");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// IDs of every submission directory under the root.
    pub fn list_submission_ids(&self) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<i64>().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Move a submission subtree out of the live root. Returns its new home.
    pub fn quarantine_submission(&self, id: i64) -> Result<PathBuf> {
        let quarantine = self.root.join(QUARANTINE_DIR_NAME);
        create_dir_all(&quarantine)?;
        let target = quarantine.join(format!("{id}-{}", Utc::now().format("%Y%m%dT%H%M%S%.f")));
        fs::rename(self.submission_dir(id), &target)?;
        warn!(submission = id, to = %target.display(), "Quarantined orphaned submission tree");
        Ok(target)
    }

    pub fn read_meta(&self, id: i64, name: &str) -> Result<SubmissionMeta> {
        read_json(&self.meta_path(id, name))
    }

    pub fn write_meta(&self, id: i64, name: &str, meta: &SubmissionMeta) -> Result<()> {
        write_json(&self.meta_path(id, name), meta)
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Write a raw file. An empty sidecar is created alongside it unless one
    /// already exists.
    pub fn write_file(&self, id: i64, name: &str, path: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.file_path(id, name, path)?, bytes)?;
        let sidecar = self.sidecar_path(id, name, path)?;
        if !sidecar.exists() {
            write_json(&sidecar, &Sidecar::default())?;
        }
        Ok(())
    }

    pub fn read_file(&self, id: i64, name: &str, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.file_path(id, name, path)?)?)
    }

    pub fn file_exists(&self, id: i64, name: &str, path: &str) -> Result<bool> {
        Ok(self.file_path(id, name, path)?.is_file())
    }

    /// Remove a raw file and its sidecar.
    pub fn remove_file(&self, id: i64, name: &str, path: &str) -> Result<()> {
        remove_file_if_exists(&self.file_path(id, name, path)?)?;
        remove_file_if_exists(&self.sidecar_path(id, name, path)?)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sidecars
    // ------------------------------------------------------------------

    pub fn read_sidecar(&self, id: i64, name: &str, path: &str) -> Result<Sidecar> {
        read_json(&self.sidecar_path(id, name, path)?)
    }

    pub fn write_sidecar(&self, id: i64, name: &str, path: &str, sidecar: &Sidecar) -> Result<()> {
        write_json(&self.sidecar_path(id, name, path)?, sidecar)
    }

    pub fn remove_sidecar(&self, id: i64, name: &str, path: &str) -> Result<bool> {
        remove_file_if_exists(&self.sidecar_path(id, name, path)?)
    }

    /// Read a sidecar, treating a missing document as empty.
    fn sidecar_or_default(&self, id: i64, name: &str, path: &str) -> Result<Sidecar> {
        match self.read_sidecar(id, name, path) {
            Ok(sidecar) => Ok(sidecar),
            Err(e) if e.is_not_found() => Ok(Sidecar::default()),
            Err(e) => Err(e),
        }
    }

    pub fn append_comment(&self, id: i64, name: &str, path: &str, comment: &Comment) -> Result<()> {
        let mut sidecar = self.sidecar_or_default(id, name, path)?;
        sidecar.comments.push(comment.clone());
        self.write_sidecar(id, name, path, &sidecar)
    }

    /// Replace the comment with the same ID, appending it if absent.
    /// Returns the previous version.
    pub fn replace_comment(
        &self,
        id: i64,
        name: &str,
        path: &str,
        comment: &Comment,
    ) -> Result<Option<Comment>> {
        let mut sidecar = self.sidecar_or_default(id, name, path)?;
        let previous = match sidecar.comments.iter_mut().find(|c| c.id == comment.id) {
            Some(slot) => Some(std::mem::replace(slot, comment.clone())),
            None => {
                sidecar.comments.push(comment.clone());
                None
            }
        };
        self.write_sidecar(id, name, path, &sidecar)?;
        Ok(previous)
    }

    /// Drop a comment from a sidecar. Returns whether it was present.
    pub fn remove_comment(&self, id: i64, name: &str, path: &str, comment_id: i64) -> Result<bool> {
        let mut sidecar = self.sidecar_or_default(id, name, path)?;
        let before = sidecar.comments.len();
        sidecar.comments.retain(|c| c.id != comment_id);
        if sidecar.comments.len() == before {
            return Ok(false);
        }
        self.write_sidecar(id, name, path, &sidecar)?;
        Ok(true)
    }

    /// Submission-relative paths of every sidecar under a submission.
    pub fn list_sidecars(&self, id: i64, name: &str) -> Result<Vec<String>> {
        let base = self.sidecar_dir(id, name);
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if is_temp_name(&file_name) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&base) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if let Some(path) = relative.strip_suffix(SIDECAR_EXT) {
                paths.push(path.to_string());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Delete temp files left behind by interrupted writes.
    pub fn remove_stale_temps(&self, id: i64) -> Result<usize> {
        let base = self.submission_dir(id);
        if !base.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(submission = id, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file()
                && is_temp_name(&entry.file_name().to_string_lossy())
                && remove_file_if_exists(entry.path())?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
