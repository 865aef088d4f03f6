//! Harvest orchestration and rate governance
//!
//! This module drives the crawl: it walks discovery pages, lists candidate
//! ids per unit, fetches the ones not yet collected and hands them to a
//! [`RecordSink`](crate::output::RecordSink), persisting progress as it goes.
//!
//! # Overview
//!
//! 1. **Admission**: every remote call first asks the
//!    [`rate_limit::BudgetTracker`] for a slot in its endpoint class
//! 2. **Classification**: failures are mapped to an
//!    [`retry::ErrorClass`] and [`retry::RetryPolicy`] decides what follows
//! 3. **Orchestration**: [`executor::Harvester`] runs the single worker loop
//!    and snapshots progress every few units
//! 4. **Lifecycle**: [`job::Lifecycle`] publishes `Idle -> Running ->
//!    Paused -> Draining -> Stopped` transitions
//!
//! # Quick Start
//!
//! ```no_run
//! use match_harvester::harvester::{HarvestConfig, Harvester};
//! use match_harvester::fetcher::riot::RiotSource;
//! use match_harvester::output::jsonl::JsonlSink;
//! use match_harvester::resume::ProgressStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RiotSource::builder("euw1", vec!["RGAPI-...".to_string()]).build()?;
//! let config = HarvestConfig::default().with_snapshot_every(1);
//! let mut harvester = Harvester::new(
//!     Arc::new(source),
//!     Box::new(JsonlSink::open("data/shared/matches.jsonl")?),
//!     ProgressStore::new("data/shared/progress.json"),
//!     config,
//! )?;
//! let summary = harvester.run().await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Per-unit and per-id failures never leave the run loop; they are counted
//! and skipped. Only [`HarvestError`] escapes `run`:
//! - storage failures (sink or progress file) abort the run
//! - configuration and lifecycle misuse are rejected up front

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;
pub mod retry;

pub use config::HarvestConfig;
pub use executor::{CallGuard, Harvester};
pub use job::{HarvesterState, Lifecycle, RunSummary};
pub use rate_limit::{BudgetTracker, EndpointClass, RateLimitError, WindowSpec};
pub use retry::{ErrorClass, GiveUpReason, RetryDecision, RetryPolicy};

use crate::output::OutputError;
use crate::resume::ResumeError;

/// Errors that end a harvest run
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The sink or the progress store cannot persist
    #[error("durability failure: {0}")]
    DurabilityFailure(String),

    /// Progress state is unreadable
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// Rejected tunables
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Illegal lifecycle edge
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// State before the attempted transition
        from: HarvesterState,
        /// Requested state
        to: HarvesterState,
    },
}

impl From<OutputError> for HarvestError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Corrupt { .. } => Self::CorruptState(err.to_string()),
            other => Self::DurabilityFailure(other.to_string()),
        }
    }
}

impl From<ResumeError> for HarvestError {
    fn from(err: ResumeError) -> Self {
        if err.is_corruption() {
            Self::CorruptState(err.to_string())
        } else {
            Self::DurabilityFailure(err.to_string())
        }
    }
}

impl From<RateLimitError> for HarvestError {
    fn from(err: RateLimitError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
