//! Harvester lifecycle and run summaries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use super::HarvestError;
use crate::resume::Counters;

/// Observable lifecycle of one harvester instance.
///
/// ```text
/// Idle -> Running <-> Paused
///            |          |
///            +-> Draining <-+
///                  |
///               Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HarvesterState {
    /// Constructed, not started
    #[default]
    Idle,
    /// Issuing requests
    Running,
    /// Waiting out a server-reported rate limit
    Paused,
    /// Stop requested; finishing the current item and flushing state
    Draining,
    /// Terminal
    Stopped,
}

impl HarvesterState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: HarvesterState) -> bool {
        use HarvesterState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Draining)
                | (Running, Paused)
                | (Running, Draining)
                | (Paused, Running)
                | (Paused, Draining)
                | (Draining, Stopped)
        )
    }
}

impl fmt::Display for HarvesterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Publishes lifecycle transitions to any number of observers.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<HarvesterState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Lifecycle starting in [`HarvesterState::Idle`]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HarvesterState::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    pub fn current(&self) -> HarvesterState {
        *self.tx.borrow()
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<HarvesterState> {
        self.tx.subscribe()
    }

    /// Move to `next`; staying in the current state is a no-op.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidTransition`] for an illegal edge.
    pub fn transition(&self, next: HarvesterState) -> Result<(), HarvestError> {
        let current = self.current();
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        self.tx.send_replace(next);
        info!(from = %current, to = %next, "Harvester state changed");
        Ok(())
    }

    /// Running -> Paused, ignored in any other state
    pub fn pause(&self) {
        if self.current() == HarvesterState::Running {
            let _ = self.transition(HarvesterState::Paused);
        }
    }

    /// Paused -> Running, ignored in any other state
    pub fn resume(&self) {
        if self.current() == HarvesterState::Paused {
            let _ = self.transition(HarvesterState::Running);
        }
    }
}

/// Outcome of one `run` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Batches started
    pub batches: u32,
    /// Units processed during this run (skipped units excluded)
    pub units_processed: usize,
    /// Records appended to the sink during this run
    pub records_appended: usize,
    /// Fetched records the category filter rejected
    pub records_filtered: usize,
    /// Whether the run ended because of a stop signal
    pub interrupted: bool,
    /// Lineage counters at the end of the run
    pub counters: Counters,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl RunSummary {
    /// Human-readable one-line summary
    pub fn format_summary(&self) -> String {
        let mut line = format!(
            "[SUMMARY] {} units, {} new records ({} filtered) in {} batch(es), {:.1}s",
            self.units_processed,
            self.records_appended,
            self.records_filtered,
            self.batches,
            self.elapsed.as_secs_f64()
        );
        if self.interrupted {
            line.push_str(" - interrupted");
        }
        line
    }
}
