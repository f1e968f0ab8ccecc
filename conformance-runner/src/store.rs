// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisting result sets to disk.
//!
//! The full form is a JSON array of [`TestResult`]s. The compact form keeps only each test's
//! status code and root-relative path, and is meant for archiving.

use crate::{
    errors::StoreError,
    results::{ResultSet, TestResult},
    status::CompactStatus,
};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, Write},
    time::Duration,
};
use tracing::debug;

/// A result file on disk.
#[derive(Clone, Debug)]
pub struct ResultStore {
    path: Utf8PathBuf,
}

impl ResultStore {
    /// Creates a store for the given result file. The file doesn't have to exist.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the result file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the path to the lock file guarding the result file.
    pub fn lock_path(&self) -> Utf8PathBuf {
        let mut lock_path = self.path.clone().into_string();
        lock_path.push_str(".lock");
        lock_path.into()
    }

    /// Loads the result file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(&self) -> Result<Option<ResultSet>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    error,
                });
            }
        };

        let results: Vec<TestResult> =
            serde_json::from_str(&contents).map_err(|error| StoreError::Deserialize {
                path: self.path.clone(),
                error,
            })?;
        debug!("loaded {} results from {}", results.len(), self.path);
        Ok(Some(ResultSet::from_results(results)))
    }

    /// Acquires an exclusive lock on the result file.
    ///
    /// The lock is held until the returned guard is dropped or consumed. Locking blocks while
    /// another process holds the lock.
    pub fn lock_exclusive(&self) -> Result<ExclusiveLockedResultStore<'_>, StoreError> {
        create_parent_dir(&self.path)?;

        let lock_path = self.lock_path();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|error| StoreError::FileLock {
                path: lock_path.clone(),
                error,
            })?;

        file.lock().map_err(|error| StoreError::FileLock {
            path: lock_path,
            error,
        })?;

        Ok(ExclusiveLockedResultStore {
            store: self,
            locked_file: file,
        })
    }

    /// Writes `results`, replacing the file atomically. Takes the lock for the duration of the
    /// write.
    pub fn persist(&self, results: &ResultSet) -> Result<(), StoreError> {
        self.lock_exclusive()?.persist(results)
    }
}

/// A [`ResultStore`] locked for exclusive access.
#[derive(Debug)]
pub struct ExclusiveLockedResultStore<'store> {
    store: &'store ResultStore,
    locked_file: File,
}

impl ExclusiveLockedResultStore<'_> {
    /// Loads the result file under the lock.
    pub fn load(&self) -> Result<Option<ResultSet>, StoreError> {
        self.store.load()
    }

    /// Writes `results` and releases the lock.
    ///
    /// The file is written to a temporary location and renamed into place, so a failed write
    /// leaves the previous contents untouched.
    pub fn persist(self, results: &ResultSet) -> Result<(), StoreError> {
        let path = &self.store.path;
        let json = serde_json::to_string_pretty(results.results()).map_err(|error| {
            StoreError::Serialize {
                path: path.clone(),
                error,
            }
        })?;
        write_atomic(path, json.as_bytes())?;
        debug!("wrote {} results to {path}", results.total());

        // Errors here don't matter since the file is closed right after.
        _ = self.locked_file.unlock();
        Ok(())
    }
}

/// One entry in the compact form.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct CompactEntry {
    s: CompactStatus,
    p: Utf8PathBuf,
}

/// Writes `results` to `path` in the compact form, with paths made relative to `root`.
///
/// Paths outside `root` are written as is.
pub fn write_compact(
    results: &ResultSet,
    path: &Utf8Path,
    root: &Utf8Path,
) -> Result<(), StoreError> {
    let entries: Vec<_> = results
        .results()
        .iter()
        .map(|result| CompactEntry {
            s: result.status.compact(),
            p: result
                .path
                .strip_prefix(root)
                .unwrap_or(&result.path)
                .to_owned(),
        })
        .collect();

    let json = serde_json::to_string(&entries).map_err(|error| StoreError::Serialize {
        path: path.to_owned(),
        error,
    })?;
    create_parent_dir(path)?;
    write_atomic(path, json.as_bytes())
}

/// Reads a compact result file.
///
/// The results have empty messages and zero memory and duration, since the compact form doesn't
/// keep them.
pub fn read_compact(path: &Utf8Path) -> Result<ResultSet, StoreError> {
    let contents = std::fs::read_to_string(path).map_err(|error| StoreError::Read {
        path: path.to_owned(),
        error,
    })?;
    let entries: Vec<CompactEntry> =
        serde_json::from_str(&contents).map_err(|error| StoreError::Deserialize {
            path: path.to_owned(),
            error,
        })?;

    Ok(entries
        .into_iter()
        .map(|entry| TestResult {
            status: entry.s.status(),
            message: String::new(),
            path: entry.p,
            memory_kb: 0,
            duration: Duration::ZERO,
        })
        .collect())
}

fn create_parent_dir(path: &Utf8Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|error| StoreError::CreateDir {
                dir: dir.to_owned(),
                error,
            })
        }
        _ => Ok(()),
    }
}

fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<(), StoreError> {
    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
        .write(|file| file.write_all(contents))
        .map_err(|error| StoreError::Write {
            path: path.to_owned(),
            error,
        })
}
