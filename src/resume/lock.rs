//! Partition lock
//!
//! Advisory exclusive lock (fd-lock) on `<partition>/harvest.lock`, held for
//! the whole lifetime of a harvest so that two processes never drive the same
//! progress file. It is a separate file from the progress store's own
//! `.lock`, which is only held around individual reads and writes.

use super::state::ResumeError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// File name of the partition lock
pub const PARTITION_LOCK_FILE: &str = "harvest.lock";

/// Lock file of one partition.
pub struct PartitionLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl PartitionLock {
    /// Open (creating if needed) the lock file in `partition_dir`
    pub fn open(partition_dir: &Path) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(partition_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let path = partition_dir.join(PARTITION_LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without blocking.
    ///
    /// The lock is released when the returned guard is dropped.
    ///
    /// # Errors
    /// Fails immediately if another process holds the partition.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>, ResumeError> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "partition is in use by another harvester ({path}): {e}"
            ))
        })
    }
}
