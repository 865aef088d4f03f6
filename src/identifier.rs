//! Match id and partition key parsing and validation
//!
//! Match ids use the format `PLATFORM_NUMBER` (e.g. `KR_7123456789`).
//! Partition keys name an independent harvesting lane: `shared` when every
//! API key rotates through one budget, `key-N` for a dedicated key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Globally unique match identifier using format PLATFORM_NUMBER
///
/// The platform prefix is normalized to uppercase.
///
/// # Examples
///
/// ```
/// use match_harvester::identifier::MatchId;
///
/// let id = MatchId::parse("kr_7123456789").unwrap();
/// assert_eq!(id.platform(), "KR");
/// assert_eq!(id.number(), 7123456789);
/// assert_eq!(id.to_string(), "KR_7123456789");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatchId {
    platform: String,
    number: u64,
}

impl MatchId {
    /// Parse a match id string
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing, the platform prefix is
    /// empty or not alphanumeric, or the number part is not a decimal integer
    /// written without leading zeros.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let s = s.trim();
        let (platform, number) = s.rsplit_once('_').ok_or_else(|| {
            IdentifierError::InvalidFormat(format!(
                "invalid match id '{s}': expected PLATFORM_NUMBER"
            ))
        })?;

        if platform.is_empty() {
            return Err(IdentifierError::InvalidFormat(format!(
                "invalid match id '{s}': platform component cannot be empty"
            )));
        }
        if !platform.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentifierError::InvalidFormat(format!(
                "invalid match id '{s}': platform must be alphanumeric"
            )));
        }
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdentifierError::InvalidFormat(format!(
                "invalid match id '{s}': number component must be decimal digits"
            )));
        }
        if number.len() > 1 && number.starts_with('0') {
            return Err(IdentifierError::InvalidFormat(format!(
                "invalid match id '{s}': number component has leading zeros"
            )));
        }

        let number = number.parse::<u64>().map_err(|e| {
            IdentifierError::InvalidFormat(format!("invalid match id '{s}': {e}"))
        })?;

        Ok(Self {
            platform: platform.to_uppercase(),
            number,
        })
    }

    /// Platform prefix (uppercase, e.g. "KR", "EUW1")
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Numeric part of the id
    pub fn number(&self) -> u64 {
        self.number
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.platform, self.number)
    }
}

impl FromStr for MatchId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MatchId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MatchId> for String {
    fn from(id: MatchId) -> Self {
        id.to_string()
    }
}

/// A harvesting partition: selects the progress file, raw store and rate
/// budget used by one harvester instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    /// All configured keys rotate through one shared budget
    Shared,
    /// A single dedicated key, by index
    Key(usize),
}

impl PartitionKey {
    /// Partition for an optional dedicated key index
    pub fn from_index(index: Option<usize>) -> Self {
        index.map(Self::Key).unwrap_or(Self::Shared)
    }

    /// Directory-safe name ("shared", "key-0", ...)
    pub fn to_filesystem_safe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Key(index) => write!(f, "key-{index}"),
        }
    }
}

impl FromStr for PartitionKey {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "shared" {
            return Ok(Self::Shared);
        }
        let index = s
            .strip_prefix("key-")
            .ok_or_else(|| {
                IdentifierError::InvalidFormat(format!(
                    "invalid partition '{s}': expected 'shared' or 'key-N'"
                ))
            })?
            .parse::<usize>()
            .map_err(|e| IdentifierError::InvalidFormat(format!("invalid partition '{s}': {e}")))?;
        Ok(Self::Key(index))
    }
}

/// Errors that can occur during identifier parsing
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// Invalid identifier format
    #[error("identifier error: {0}")]
    InvalidFormat(String),
}
