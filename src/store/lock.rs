//! store::lock
//!
//! OS-level locks serializing access to rows and sequences.
//!
//! # Architecture
//!
//! Two lock flavors share one RAII guard:
//!
//! - **Row locks** serialize mutations of a single entity (an
//!   intervention's transitions, a partner's HACT recompute). Acquisition
//!   is non-blocking: a held lock surfaces as a conflict the caller may
//!   retry.
//! - **Sequence locks** serialize reference-number allocation per
//!   sequence name. Acquisition blocks: the critical section is a counter
//!   bump, so waiting is cheap and keeps allocation strictly ordered.
//!
//! # Invariants
//!
//! - A lock is held for the lifetime of the guard and released on drop
//! - Lock files live under `<root>/locks/` and are never deleted (the
//!   lock state lives in the OS, not the file content)

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("entity is locked by another operation")]
    AlreadyLocked,

    /// Failed to create the lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// I/O error during lock operations.
    #[error("lock i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// An exclusive lock guard. Released on drop.
#[derive(Debug)]
pub struct EntityLock {
    path: PathBuf,
    file: Option<File>,
}

impl EntityLock {
    /// Acquire a row lock, failing fast if it is already held.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another operation holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    pub fn acquire_row(locks_dir: &Path, kind: &str, id: &str) -> Result<Self, LockError> {
        let file = Self::open(locks_dir, &format!("{}-{}", kind, id))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path: locks_dir.join(format!("{}-{}.lock", kind, id)),
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Acquire a sequence lock, blocking until it is free.
    pub fn acquire_sequence(locks_dir: &Path, name: &str) -> Result<Self, LockError> {
        let file = Self::open(locks_dir, &format!("seq-{}", name))?;
        file.lock_exclusive()
            .map_err(|e| LockError::AcquireFailed(e.to_string()))?;
        Ok(Self {
            path: locks_dir.join(format!("seq-{}.lock", name)),
            file: Some(file),
        })
    }

    fn open(locks_dir: &Path, stem: &str) -> Result<File, LockError> {
        fs::create_dir_all(locks_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", locks_dir.display(), e))
        })?;
        let path = locks_dir.join(format!("{}.lock", stem));
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e)))
    }

    /// Check if the lock is currently held by this guard.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        self.release();
    }
}
