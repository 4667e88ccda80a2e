//! Single-flight guard for restores
//!
//! Only one restore may run against the store at a time, whether it comes
//! from the HTTP server or from `sreq-admin restore` in another process.
//! The gate pairs an in-process mutex with an exclusive advisory lock on a
//! file in the backup directory. The OS drops the file lock when the holder
//! exits, so a crashed restore never leaves the gate closed.
//!
//! A second caller gets [`GateError::Busy`] instead of waiting.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Lock file name inside the backup directory
pub const RESTORE_LOCK_FILE: &str = ".restore.lock";

#[derive(Debug, Error)]
pub enum GateError {
    /// Another restore holds the gate
    #[error("restore already in progress")]
    Busy,

    /// Lock file could not be opened or locked
    #[error("restore lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Shared restore lock held in application state
#[derive(Debug, Clone)]
pub struct RestoreGate {
    inner: Arc<Mutex<()>>,
    lock_path: PathBuf,
}

/// Held for the duration of one restore; releases on drop
#[derive(Debug)]
pub struct RestoreGuard {
    file: File,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        // Closing the file releases the lock as well
        let _ = self.file.unlock();
        debug!("Released restore lock");
    }
}

impl RestoreGate {
    /// Gate locking `<backup_dir>/.restore.lock`
    pub fn for_backup_dir(backup_dir: &Path) -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
            lock_path: backup_dir.join(RESTORE_LOCK_FILE),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Acquire the gate without waiting
    pub fn try_acquire(&self) -> Result<RestoreGuard, GateError> {
        let guard = self
            .inner
            .clone()
            .try_lock_owned()
            .map_err(|_| GateError::Busy)?;

        let lock_error = |source| GateError::Lock {
            path: self.lock_path.clone(),
            source,
        };

        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_error)?;
        }

        // The lock file itself is never removed; only the lock on it matters
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(lock_error)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
                || e.kind() == std::io::ErrorKind::WouldBlock
            {
                debug!(path = %self.lock_path.display(), "Restore lock held by another process");
                return Err(GateError::Busy);
            }
            return Err(lock_error(e));
        }

        Ok(RestoreGuard {
            file,
            _guard: guard,
        })
    }

    /// Whether a restore in this process currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
