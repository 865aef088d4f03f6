//! Durable progress store
//!
//! Writes are atomic (temp file in the same directory, fsync, rename, fsync
//! of the parent directory) and serialized through an advisory `fd-lock` on
//! a sibling `.lock` file. A progress file that cannot be trusted is moved
//! aside, never deleted, and harvesting restarts from an empty snapshot.

use chrono::Utc;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::state::{ProgressSnapshot, ResumeError, SnapshotEnvelope, MAX_STATE_FILE_SIZE};

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// No progress file existed; a new lineage starts
    Fresh,
    /// Restored from the progress file
    Restored,
    /// The progress file was corrupt and has been moved aside
    Quarantined {
        /// New location of the corrupt file
        moved_to: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

/// Result of [`ProgressStore::load`].
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// Snapshot to resume from (empty unless restored)
    pub snapshot: ProgressSnapshot,
    /// How it was obtained
    pub origin: SnapshotOrigin,
}

/// Progress file of one partition.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Progress file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn open_lock_file(&self) -> Result<File, ResumeError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))
    }

    /// Read and verify a progress file without side effects.
    ///
    /// # Errors
    /// Any I/O, decoding, checksum, schema or consistency failure.
    pub fn inspect(path: &Path) -> Result<ProgressSnapshot, ResumeError> {
        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents = std::fs::read(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let envelope: SnapshotEnvelope = serde_json::from_slice(&contents)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))?;
        envelope.open()
    }

    /// Load the snapshot to resume from.
    ///
    /// A missing file yields an empty snapshot. A file that is unreadable,
    /// undecodable, checksum-mismatched, of another schema major version or
    /// inconsistent is quarantined and also yields an empty snapshot.
    ///
    /// # Errors
    /// Only when the store itself is unusable (lock or quarantine failure).
    pub fn load(&self) -> Result<LoadedSnapshot, ResumeError> {
        debug!(path = %self.path.display(), "Loading progress snapshot");

        let lock_file = self.open_lock_file()?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire lock: {e}")))?;

        if !self.path.exists() {
            info!(path = %self.path.display(), "No progress file, starting a new lineage");
            return Ok(LoadedSnapshot {
                snapshot: ProgressSnapshot::new(),
                origin: SnapshotOrigin::Fresh,
            });
        }

        match Self::inspect(&self.path) {
            Ok(snapshot) => {
                info!(
                    processed = snapshot.processed().len(),
                    collected = snapshot.collected().len(),
                    cursor = %snapshot.cursor(),
                    "Progress snapshot restored"
                );
                Ok(LoadedSnapshot {
                    snapshot,
                    origin: SnapshotOrigin::Restored,
                })
            }
            Err(err) => {
                let reason = err.to_string();
                let moved_to = self.quarantine()?;
                error!(
                    path = %self.path.display(),
                    quarantined = %moved_to.display(),
                    error = %reason,
                    "Progress file is corrupt; starting from empty state. Previously collected ids may be fetched again"
                );
                Ok(LoadedSnapshot {
                    snapshot: ProgressSnapshot::new(),
                    origin: SnapshotOrigin::Quarantined { moved_to, reason },
                })
            }
        }
    }

    fn quarantine(&self) -> Result<PathBuf, ResumeError> {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("progress");
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = self.path.with_file_name(format!("{stem}.corrupt-{stamp}.json"));
        std::fs::rename(&self.path, &target).map_err(|e| {
            ResumeError::IoError(format!(
                "Failed to quarantine {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(target)
    }

    /// Persist `snapshot` atomically.
    ///
    /// # Errors
    /// Any failure leaves the previous file intact and is reported.
    pub fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), ResumeError> {
        debug!(
            path = %self.path.display(),
            processed = snapshot.processed().len(),
            collected = snapshot.collected().len(),
            "Saving progress snapshot"
        );

        let envelope = SnapshotEnvelope::seal(snapshot.clone())?;
        let json = serde_json::to_string_pretty(&envelope)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_file = self.open_lock_file()?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Err(e) = sync_dir(parent_dir) {
            warn!(
                dir = %parent_dir.display(),
                error = %e,
                "Progress directory sync failed; the rename may not survive a crash"
            );
        }

        debug!(
            path = %self.path.display(),
            counters = %snapshot.counters(),
            "Progress snapshot saved"
        );
        Ok(())
    }

    /// Delete the progress file, starting a new lineage on the next load.
    ///
    /// Returns `false` if there was nothing to delete.
    pub fn delete(&self) -> Result<bool, ResumeError> {
        let lock_file = self.open_lock_file()?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire lock: {e}")))?;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(path = %self.path.display(), "Progress file deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ResumeError::IoError(e.to_string())),
        }
    }

    /// Load, forget processed units and cursor, save. Collected ids and
    /// counters survive.
    pub fn reset_progress(&self) -> Result<ProgressSnapshot, ResumeError> {
        let mut snapshot = self.load()?.snapshot;
        snapshot.reset_progress();
        self.save(&snapshot)?;
        Ok(snapshot)
    }

    /// Load, forget units from `tiers`, save. Returns the units forgotten.
    pub fn clear_tiers(&self, tiers: &[String]) -> Result<usize, ResumeError> {
        let mut snapshot = self.load()?.snapshot;
        let cleared = snapshot.clear_tiers(tiers);
        self.save(&snapshot)?;
        Ok(cleared)
    }
}

/// Flush a directory entry so a rename inside it is durable
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}
