// Standard library imports
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

// External crate imports
use tracing::debug;

// Internal crate imports
use crate::error::DbInfraError;

/// A held migration lock. Dropping the guard releases the OS lock as well;
/// `release` exists so callers can release at a precise point and log it.
pub struct Guard {
    file: Option<File>,
    lock_path: PathBuf,
}

impl Guard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(mut self) -> Result<(), DbInfraError> {
        self.unlock();
        Ok(())
    }

    /// Unlink the lock file, then release. Contenders that opened the old
    /// file before the unlink notice on acquire and retry.
    pub fn remove_and_release(mut self) -> Result<(), DbInfraError> {
        let removed = match std::fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DbInfraError::io(self.lock_path.clone(), e)),
        };
        self.unlock();
        removed
    }

    fn unlock(&mut self) {
        use fs4::fs_std::FileExt;

        let Some(file) = self.file.take() else {
            return;
        };

        match FileExt::unlock(&file) {
            Ok(()) => {
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock released");
            }
            Err(e) => {
                // The handle is dropped right after, which releases the lock anyway.
                debug!(
                    error = %e,
                    lock_path = %self.lock_path.display(),
                    "SQLite file unlock returned error (may be benign)"
                );
            }
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// OS-level exclusive lock on `<db>.migrate.lock`, shared by every process
/// migrating the same store. `try_acquire` never blocks; callers own the
/// backoff loop.
pub struct SqliteFileLock {
    lock_path: PathBuf,
}

impl SqliteFileLock {
    pub fn new(lock_path: &Path) -> Self {
        Self {
            lock_path: lock_path.to_path_buf(),
        }
    }

    /// `Some(Guard)` when acquired, `None` when another holder has it.
    pub fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        use fs4::fs_std::FileExt;

        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbInfraError::io(parent.to_path_buf(), e))?;
        }

        // Lock files are ephemeral - truncate on create to ensure clean state
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| DbInfraError::io(self.lock_path.clone(), e))?;

        // Ok(true) = acquired, Ok(false) = would block
        match file.try_lock_exclusive() {
            Ok(true) if !is_linked_at(&file, &self.lock_path) => {
                // Won a file that a previous holder already unlinked.
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock went stale");
                Ok(None)
            }
            Ok(true) => {
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock acquired");
                Ok(Some(Guard {
                    file: Some(file),
                    lock_path: self.lock_path.clone(),
                }))
            }
            Ok(false) => {
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock contended");
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(DbInfraError::lock(format!(
                "failed to acquire SQLite file lock {}: {e}",
                self.lock_path.display()
            ))),
        }
    }
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> bool {
    path.exists()
}
