//! Remote match sources
//!
//! [`MatchSource`] is the seam between the harvester and the remote API.
//! Implementations perform exactly one remote call per method invocation;
//! pacing and retries belong to the harvester.

use async_trait::async_trait;
use std::time::Duration;

use crate::harvester::retry::ErrorClass;
use crate::{DetailRecord, MatchId, UnitRef};

pub mod riot;
pub mod riot_config;
pub mod riot_http;
pub mod riot_parser;
pub mod shared_resources;

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// HTTP 429
    #[error("rate limit exceeded{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Server-supplied wait, if any
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx
    #[error("server error: HTTP {status}")]
    Server {
        /// Status code
        status: u16,
    },

    /// Connection, DNS or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its time bound
    #[error("request timed out")]
    Timeout,

    /// HTTP 4xx other than 429
    #[error("client error: HTTP {status}: {message}")]
    Client {
        /// Status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// An identifier returned by the server is malformed
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Source misconfiguration (unknown platform, no keys, ...)
    #[error("configuration error: {0}")]
    Config(String),
}

impl FetcherError {
    /// Retry classification of this failure
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Server { .. } | Self::Network(_) | Self::Timeout => ErrorClass::Transient,
            Self::Client { .. } | Self::Parse(_) | Self::InvalidIdentifier(_) | Self::Config(_) => {
                ErrorClass::Fatal
            }
        }
    }

    /// Server-supplied wait for a rate-limited response
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify an HTTP error status
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::Server { status },
            _ => Self::Client {
                status,
                message: message.into(),
            },
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Remote source of discovery units, candidate ids and detail records.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Discovery units on logical page `page` (0-based).
    ///
    /// An empty page marks the end of the sweep.
    async fn list_discovery_units(&self, page: u32) -> FetcherResult<Vec<UnitRef>>;

    /// Complete a unit that cannot be listed yet (see
    /// [`UnitRef::needs_resolution`]). The default returns it unchanged.
    async fn resolve_unit(&self, unit: &UnitRef) -> FetcherResult<UnitRef> {
        Ok(unit.clone())
    }

    /// Up to `count` candidate ids for `unit`, most recent first
    async fn list_candidate_identifiers(
        &self,
        unit: &UnitRef,
        count: u32,
    ) -> FetcherResult<Vec<MatchId>>;

    /// The detail record for `id`
    async fn fetch_detail(&self, id: &MatchId) -> FetcherResult<DetailRecord>;

    /// Short description for logs
    fn describe(&self) -> String {
        "match source".to_string()
    }
}
