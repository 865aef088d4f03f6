//! Raw record sinks and tabular exports

use serde::Serialize;

use crate::{DetailRecord, MatchId};

pub mod csv;
pub mod jsonl;
pub mod path;

pub use path::PartitionLayout;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Existing store content cannot be read back
    #[error("corrupt record store {path} at line {line}: {reason}")]
    Corrupt {
        /// Store path
        path: String,
        /// 1-based line number
        line: usize,
        /// Decoder message
        reason: String,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One row of the tabular export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    /// Match id
    pub match_id: String,
    /// Queue id, if recorded
    pub queue_id: Option<u32>,
    /// Game version, if recorded
    pub game_version: Option<String>,
    /// Creation time in Unix milliseconds, if recorded
    pub game_creation: Option<i64>,
    /// Number of participants
    pub participants: usize,
    /// Winning team id, if recorded
    pub winning_team: Option<i64>,
}

impl From<&DetailRecord> for ExportRow {
    fn from(record: &DetailRecord) -> Self {
        Self {
            match_id: record.id.to_string(),
            queue_id: record.queue_id,
            game_version: record.game_version.clone(),
            game_creation: record.game_creation,
            participants: record.participant_count(),
            winning_team: record.winning_team(),
        }
    }
}

/// Durable destination of fetched records.
///
/// `append` must not return `Ok` before the record is durable.
pub trait RecordSink: Send + Sync {
    /// Append `record`; returns `Ok(false)` if its id is already stored
    fn append(&mut self, record: &DetailRecord) -> OutputResult<bool>;

    /// Whether a record with `id` is stored
    fn contains(&self, id: &MatchId) -> bool;

    /// Number of stored records
    fn len(&self) -> usize;

    /// Whether the sink is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tabular view of every stored record, in append order
    fn export_snapshot(&self) -> OutputResult<Vec<ExportRow>>;
}
