//! Resumable harvesting progress
//!
//! Provides the checksummed progress snapshot, its atomic store and the
//! partition lock.

pub mod cursor;
pub mod lock;
pub mod state;
pub mod store;

pub use cursor::Cursor;
pub use lock::PartitionLock;
pub use state::{Counters, ProcessedUnit, ProgressSnapshot, ResumeError, SnapshotEnvelope};
pub use store::{LoadedSnapshot, ProgressStore, SnapshotOrigin};
