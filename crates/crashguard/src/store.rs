//! Crash report store for crashguard.
//!
//! Crash records are kept in a single file holding one JSON array. Every
//! write rewrites the whole file, so all access to a given path is serialized
//! through a process-wide lock keyed by the resolved path.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::record::CrashRecord;

/// Default crash report file name.
pub const DEFAULT_FILE_NAME: &str = "crash_reports.json";

/// What `append` does when the existing file cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptFilePolicy {
    /// Report the problem and start a fresh array, dropping the old content.
    #[default]
    Discard,
    /// Leave the malformed file untouched and drop the new record.
    Preserve,
}

/// File-backed store of crash records.
///
/// Provides:
/// - Best-effort appends that never fail the caller
/// - Retrieval of the most recent records
/// - Wiping of all records
///
/// An empty path is accepted at construction; every operation on such a
/// store fails with [`Error::NoPathConfigured`].
#[derive(Debug, Clone)]
pub struct CrashStore {
    /// Path to the crash report file.
    path: PathBuf,
    /// Behaviour on malformed content during append.
    corrupt_policy: CorruptFilePolicy,
}

impl CrashStore {
    /// Create a store for the file at `path`.
    ///
    /// Nothing is read or written until an operation is invoked.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            corrupt_policy: CorruptFilePolicy::default(),
        }
    }

    /// Set the policy applied when `append` finds a malformed file.
    #[must_use]
    pub fn with_corrupt_file_policy(mut self, policy: CorruptFilePolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }

    /// Get the path to the crash report file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the policy applied to malformed files.
    #[must_use]
    pub fn corrupt_file_policy(&self) -> CorruptFilePolicy {
        self.corrupt_policy
    }

    /// Check whether the crash report file currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.path.as_os_str().is_empty() && self.path.is_file()
    }

    /// Append a record, reporting any failure through the log.
    ///
    /// This never returns an error: it runs while a panic is being handled,
    /// and recording the crash must not become a second failure.
    pub fn append(&self, record: &CrashRecord) {
        if let Err(e) = self.try_append(record) {
            error!("Error writing crash report to file: {e}");
        }
    }

    /// Append a record, returning any failure to the caller.
    ///
    /// A missing file is treated as an empty store. A malformed file is
    /// handled according to the store's [`CorruptFilePolicy`].
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured, if the file is malformed
    /// under [`CorruptFilePolicy::Preserve`], or if the file cannot be written.
    pub fn try_append(&self, record: &CrashRecord) -> Result<()> {
        let path = self.require_path()?;
        let lock = path_lock(path);
        let _guard = hold(&lock);

        let mut records = match read_records(path) {
            Ok(records) => records,
            Err(Error::NotFound { .. }) => Vec::new(),
            Err(e @ Error::Parse { .. }) => {
                warn!("Error unmarshalling crash reports: {e}");
                if self.corrupt_policy == CorruptFilePolicy::Preserve {
                    return Err(Error::CorruptFile {
                        path: path.to_path_buf(),
                    });
                }
                Vec::new()
            }
            Err(e) => {
                warn!("Error reading crash reports: {e}");
                Vec::new()
            }
        };

        records.push(record.clone());
        write_records(path, &records)?;
        debug!(
            "Appended crash report to {} ({} total)",
            path.display(),
            records.len()
        );
        Ok(())
    }

    /// Get the last `n` records, oldest first.
    ///
    /// Asking for more records than exist returns all of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPathConfigured`], [`Error::NotFound`] or
    /// [`Error::Parse`] when the file cannot be read as a record array.
    pub fn tail(&self, n: usize) -> Result<Vec<CrashRecord>> {
        let path = self.require_path()?;
        let mut records = {
            let lock = path_lock(path);
            let _guard = hold(&lock);
            read_records(path)?
        };

        let keep = n.min(records.len());
        Ok(records.split_off(records.len() - keep))
    }

    /// Count the records in the file.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`CrashStore::tail`].
    pub fn count(&self) -> Result<usize> {
        let path = self.require_path()?;
        let lock = path_lock(path);
        let _guard = hold(&lock);
        Ok(read_records(path)?.len())
    }

    /// Remove every record, leaving an empty array.
    ///
    /// The file is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPathConfigured`] or a write error.
    pub fn wipe(&self) -> Result<()> {
        let path = self.require_path()?;
        let lock = path_lock(path);
        let _guard = hold(&lock);
        write_records(path, &[])?;
        debug!("Wiped crash reports at {}", path.display());
        Ok(())
    }

    fn require_path(&self) -> Result<&Path> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::NoPathConfigured);
        }
        Ok(&self.path)
    }
}

/// Read and parse the whole file.
fn read_records(path: &Path) -> Result<Vec<CrashRecord>> {
    let data = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            Error::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    serde_json::from_slice(&data).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the file contents with `records` as an indented JSON array.
fn write_records(path: &Path, records: &[CrashRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let data = serde_json::to_vec_pretty(records)?;
    fs::write(path, data).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Get the process-wide lock for `path`.
///
/// Two spellings of the same file (relative and absolute) resolve to the same
/// key and share a lock.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let mut locks = LOCKS
        .get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(resolve(path)).or_default())
}

/// Hold `lock`, ignoring poisoning left behind by a panicking holder.
fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve `path` to an absolute, canonical form where possible.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |dir| dir.join(path))
    };

    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return absolute;
    };

    // Canonicalize the nearest existing ancestor and re-attach the rest, so
    // the key is the same before and after parent directories are created.
    let mut existing = parent;
    let mut missing = vec![name.to_os_string()];
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(up), Some(part)) => {
                missing.push(part.to_os_string());
                existing = up;
            }
            _ => return absolute,
        }
    }
}
