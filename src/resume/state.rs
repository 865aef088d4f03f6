//! Progress snapshot and its on-disk envelope
//!
//! A [`ProgressSnapshot`] is the complete resumable state of one partition:
//! processed discovery units, collected match ids, the page cursor and the
//! cumulative request counters. It is only ever persisted whole, wrapped in a
//! [`SnapshotEnvelope`] carrying a schema version and a SHA-256 checksum.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::cursor::Cursor;
use crate::MatchId;

/// Current snapshot schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed progress file size (512 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 512 * 1024 * 1024;

// About a century; keeps the chrono duration in range
const MAX_REFRESH_HOURS: u64 = 876_000;

/// Cumulative request counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Counters {
    /// Attempts issued
    pub requests_sent: u64,
    /// Attempts that returned a usable response
    pub requests_succeeded: u64,
    /// Attempts answered with a rate-limit response
    pub rate_limited: u64,
    /// Attempts that failed for any other reason
    pub other_errors: u64,
}

impl Counters {
    /// Count an issued attempt
    pub fn record_sent(&mut self) {
        self.requests_sent += 1;
    }

    /// Count a successful attempt
    pub fn record_success(&mut self) {
        self.requests_succeeded += 1;
    }

    /// Count a rate-limited attempt
    pub fn record_rate_limited(&mut self) {
        self.rate_limited += 1;
    }

    /// Count any other failed attempt
    pub fn record_error(&mut self) {
        self.other_errors += 1;
    }

    /// Every outcome belongs to an issued attempt
    pub fn is_consistent(&self) -> bool {
        self.requests_succeeded
            .saturating_add(self.rate_limited)
            .saturating_add(self.other_errors)
            <= self.requests_sent
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} succeeded={} rate_limited={} other_errors={}",
            self.requests_sent, self.requests_succeeded, self.rate_limited, self.other_errors
        )
    }
}

/// When a unit was processed and the tier it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedUnit {
    /// Processing time
    pub at: DateTime<Utc>,
    /// Ladder tier the unit was discovered in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// Point-in-time harvesting progress of one partition.
///
/// Invariants (checked by [`validate`](Self::validate)):
/// - the cursor's unit index never exceeds the number of processed units
/// - outcome counters never exceed the attempts issued
/// - every collected id came from a successful detail request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    processed: BTreeMap<String, ProcessedUnit>,
    collected: BTreeSet<MatchId>,
    cursor: Cursor,
    /// Detail-record requests
    counters: Counters,
    /// Listing and lookup requests
    #[serde(default)]
    discovery: Counters,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSnapshot {
    /// Empty snapshot starting a new lineage
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            processed: BTreeMap::new(),
            collected: BTreeSet::new(),
            cursor: Cursor::start(),
            counters: Counters::default(),
            discovery: Counters::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Processed units by key
    pub fn processed(&self) -> &BTreeMap<String, ProcessedUnit> {
        &self.processed
    }

    /// Collected match ids
    pub fn collected(&self) -> &BTreeSet<MatchId> {
        &self.collected
    }

    /// Resumption cursor
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Detail-request counters
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Mutable detail-request counters
    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// Listing and lookup counters
    pub fn discovery_counters(&self) -> &Counters {
        &self.discovery
    }

    /// Mutable listing and lookup counters
    pub fn discovery_counters_mut(&mut self) -> &mut Counters {
        &mut self.discovery
    }

    /// Lineage start
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether `key` was processed at all
    pub fn is_processed(&self, key: &str) -> bool {
        self.processed.contains_key(key)
    }

    /// Whether `key` was processed within the last `refresh_hours`.
    ///
    /// `refresh_hours == 0` means processed units never go stale.
    pub fn is_fresh(&self, key: &str, refresh_hours: u64, now: DateTime<Utc>) -> bool {
        let Some(unit) = self.processed.get(key) else {
            return false;
        };
        if refresh_hours == 0 {
            return true;
        }
        let max_age = ChronoDuration::hours(refresh_hours.min(MAX_REFRESH_HOURS) as i64);
        now.signed_duration_since(unit.at) < max_age
    }

    /// Record `key` as processed at `now`
    pub fn mark_processed(&mut self, key: impl Into<String>, tier: Option<String>, now: DateTime<Utc>) {
        self.processed
            .insert(key.into(), ProcessedUnit { at: now, tier });
        self.updated_at = self.updated_at.max(now);
    }

    /// Whether `id` is in the collected set
    pub fn is_collected(&self, id: &MatchId) -> bool {
        self.collected.contains(id)
    }

    /// Add `id` to the collected set; returns `false` if it was already there
    pub fn collect(&mut self, id: MatchId) -> bool {
        self.collected.insert(id)
    }

    /// Move the cursor
    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.updated_at = Utc::now();
    }

    /// Forget processed units and rewind the cursor; collected ids and
    /// counters are kept.
    pub fn reset_progress(&mut self) {
        debug!(
            processed = self.processed.len(),
            cursor = %self.cursor,
            "Resetting processed units and cursor"
        );
        self.processed.clear();
        self.cursor = Cursor::start();
        self.updated_at = Utc::now();
    }

    /// Forget processed units discovered in any of `tiers` (case-insensitive)
    /// and rewind the cursor. Returns the number of units forgotten.
    pub fn clear_tiers(&mut self, tiers: &[String]) -> usize {
        let before = self.processed.len();
        self.processed.retain(|_, unit| {
            !unit
                .tier
                .as_deref()
                .map(|t| tiers.iter().any(|wanted| wanted.eq_ignore_ascii_case(t)))
                .unwrap_or(false)
        });
        self.cursor = Cursor::start();
        self.updated_at = Utc::now();
        before - self.processed.len()
    }

    /// Check the consistency invariants
    pub fn validate(&self) -> Result<(), ResumeError> {
        if self.cursor.unit_index > self.processed.len() {
            return Err(ResumeError::Inconsistent(format!(
                "cursor ({}) points beyond the {} processed units",
                self.cursor,
                self.processed.len()
            )));
        }
        if !self.counters.is_consistent() {
            return Err(ResumeError::Inconsistent(format!(
                "detail counters exceed requests sent ({})",
                self.counters
            )));
        }
        if !self.discovery.is_consistent() {
            return Err(ResumeError::Inconsistent(format!(
                "discovery counters exceed requests sent ({})",
                self.discovery
            )));
        }
        if self.collected.len() as u64 > self.counters.requests_succeeded {
            return Err(ResumeError::Inconsistent(format!(
                "{} collected ids but only {} successful detail requests",
                self.collected.len(),
                self.counters.requests_succeeded
            )));
        }
        if self.updated_at < self.created_at {
            return Err(ResumeError::Inconsistent(
                "updated_at precedes created_at".to_string(),
            ));
        }
        Ok(())
    }

    /// Hex SHA-256 of the canonical serialization
    pub fn checksum(&self) -> Result<String, ResumeError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| ResumeError::SerializationError(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// On-disk wrapper around a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Schema version of `snapshot`
    pub schema_version: String,
    /// Hex SHA-256 of `snapshot`'s canonical serialization
    pub checksum: String,
    /// The snapshot itself
    pub snapshot: ProgressSnapshot,
}

impl SnapshotEnvelope {
    /// Wrap a snapshot, computing its checksum
    pub fn seal(snapshot: ProgressSnapshot) -> Result<Self, ResumeError> {
        let checksum = snapshot.checksum()?;
        Ok(Self {
            schema_version: SCHEMA_VERSION.to_string(),
            checksum,
            snapshot,
        })
    }

    /// Verify version, checksum and invariants, yielding the snapshot
    pub fn open(self) -> Result<ProgressSnapshot, ResumeError> {
        if major_version(&self.schema_version) != major_version(SCHEMA_VERSION) {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: self.schema_version,
            });
        }
        let actual = self.snapshot.checksum()?;
        if actual != self.checksum {
            return Err(ResumeError::ChecksumMismatch {
                expected: self.checksum,
                found: actual,
            });
        }
        self.snapshot.validate()?;
        Ok(self.snapshot)
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Errors related to progress persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Stored checksum does not match the snapshot
    #[error("checksum mismatch: stored {expected}, computed {found}")]
    ChecksumMismatch {
        /// Checksum recorded in the file
        expected: String,
        /// Checksum of the decoded snapshot
        found: String,
    },

    /// Snapshot violates a consistency invariant
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

impl ResumeError {
    /// Whether this error means the file content cannot be trusted
    /// (as opposed to the store being unusable)
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::SchemaVersionMismatch { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Inconsistent(_)
                | Self::StateTooLarge { .. }
                | Self::DeserializationError(_)
        )
    }
}
