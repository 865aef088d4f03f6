//! Per-partition file layout
//!
//! ```text
//! {root}/{partition}/progress.json
//! {root}/{partition}/progress.lock
//! {root}/{partition}/harvest.lock
//! {root}/{partition}/matches.jsonl
//! {root}/{partition}/matches.csv
//! ```

use std::path::{Path, PathBuf};

use crate::identifier::PartitionKey;
use crate::resume::lock::PARTITION_LOCK_FILE;

/// Progress snapshot file name
pub const PROGRESS_FILE: &str = "progress.json";
/// Raw record store file name
pub const RECORDS_FILE: &str = "matches.jsonl";
/// Default export file name
pub const EXPORT_FILE: &str = "matches.csv";

/// File locations of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    root: PathBuf,
    partition: PartitionKey,
}

impl PartitionLayout {
    /// Layout of `partition` under `root`
    pub fn new(root: impl Into<PathBuf>, partition: PartitionKey) -> Self {
        Self {
            root: root.into(),
            partition,
        }
    }

    /// Partition this layout belongs to
    pub fn partition(&self) -> PartitionKey {
        self.partition
    }

    /// Partition directory
    pub fn dir(&self) -> PathBuf {
        self.root.join(self.partition.to_filesystem_safe())
    }

    /// Progress snapshot path
    pub fn progress_path(&self) -> PathBuf {
        self.dir().join(PROGRESS_FILE)
    }

    /// Raw record store path
    pub fn records_path(&self) -> PathBuf {
        self.dir().join(RECORDS_FILE)
    }

    /// Default export path
    pub fn export_path(&self) -> PathBuf {
        self.dir().join(EXPORT_FILE)
    }

    /// Partition lock path
    pub fn lock_path(&self) -> PathBuf {
        self.dir().join(PARTITION_LOCK_FILE)
    }

    /// Partitions that already have a directory under `root`, sorted
    pub fn discover(root: &Path) -> Vec<PartitionKey> {
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };
        let mut keys: Vec<PartitionKey> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect();
        keys.sort_by_key(|k| match k {
            PartitionKey::Shared => (0, 0),
            PartitionKey::Key(i) => (1, *i),
        });
        keys
    }
}
