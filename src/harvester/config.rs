//! Harvest configuration constants and tunables

use super::rate_limit::WindowSpec;
use std::time::Duration;

/// Base delay of the transient backoff sequence.
pub const BASE_BACKOFF_MS: u64 = 1_000;

/// Ceiling of the transient backoff sequence.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Attempts allowed for a call failing with transient errors before it is skipped.
pub const MAX_TRANSIENT_ATTEMPTS: u32 = 3;

/// Upper bound applied to server-supplied `Retry-After` hints.
pub const MAX_SERVER_HINT_SECS: u64 = 120;

/// Requests allowed per key in the short window.
pub const SHORT_WINDOW_REQUESTS: usize = 20;
/// Short window length.
pub const SHORT_WINDOW_SECS: u64 = 1;

/// Requests allowed per key in the long window.
pub const LONG_WINDOW_REQUESTS: usize = 100;
/// Long window length.
pub const LONG_WINDOW_SECS: u64 = 120;

/// Persist a snapshot after this many processed units.
pub const DEFAULT_SNAPSHOT_EVERY: usize = 5;

/// Units processed per batch.
pub const DEFAULT_UNITS_PER_BATCH: usize = 50;

/// Candidate ids requested per unit.
pub const DEFAULT_IDS_PER_UNIT: u32 = 20;

/// Largest `count` the match-list endpoint accepts.
pub const MAX_IDS_PER_UNIT: u32 = 100;

/// Processed units become eligible again after this many hours (0 = never).
pub const DEFAULT_REFRESH_HOURS: u64 = 24;

/// Pause between batches in continuous mode.
pub const DEFAULT_BATCH_PAUSE_SECS: u64 = 5;

/// Bound on a single remote call; a timeout counts as a transient failure.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

/// Transient backoff delay before attempt `attempt + 1`.
///
/// `min(base * 2^(attempt-1), cap)`, with `attempt` counted from 1.
pub fn calculate_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(cap)
}

/// Default windows for one key, scaled by the number of keys sharing a budget.
pub fn default_windows(keys: usize) -> Vec<WindowSpec> {
    let keys = keys.max(1);
    vec![
        WindowSpec::new(
            SHORT_WINDOW_REQUESTS * keys,
            Duration::from_secs(SHORT_WINDOW_SECS),
        ),
        WindowSpec::new(
            LONG_WINDOW_REQUESTS * keys,
            Duration::from_secs(LONG_WINDOW_SECS),
        ),
    ]
}

/// Tunables for one harvester instance.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    /// Units processed per batch (already-processed units do not count)
    pub units_per_batch: usize,
    /// Candidate ids requested per unit
    pub ids_per_unit: u32,
    /// Snapshot cadence, in processed units
    pub snapshot_every: usize,
    /// Staleness threshold for re-processing a unit, in hours (0 = never)
    pub refresh_hours: u64,
    /// Keep sweeping pages until a stop signal arrives
    pub continuous: bool,
    /// Pause between batches in continuous mode
    pub batch_pause: Duration,
    /// Bound on each remote call
    pub call_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            units_per_batch: DEFAULT_UNITS_PER_BATCH,
            ids_per_unit: DEFAULT_IDS_PER_UNIT,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            refresh_hours: DEFAULT_REFRESH_HOURS,
            continuous: false,
            batch_pause: Duration::from_secs(DEFAULT_BATCH_PAUSE_SECS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl HarvestConfig {
    /// Set units per batch
    pub fn with_units_per_batch(mut self, units: usize) -> Self {
        self.units_per_batch = units;
        self
    }

    /// Set candidate ids per unit
    pub fn with_ids_per_unit(mut self, ids: u32) -> Self {
        self.ids_per_unit = ids;
        self
    }

    /// Set snapshot cadence
    pub fn with_snapshot_every(mut self, units: usize) -> Self {
        self.snapshot_every = units;
        self
    }

    /// Set the staleness threshold
    pub fn with_refresh_hours(mut self, hours: u64) -> Self {
        self.refresh_hours = hours;
        self
    }

    /// Enable or disable continuous mode
    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Set the inter-batch pause
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Validate tunables
    pub fn validate(&self) -> Result<(), String> {
        if self.units_per_batch == 0 {
            return Err("units per batch must be at least 1".to_string());
        }
        if self.ids_per_unit == 0 || self.ids_per_unit > MAX_IDS_PER_UNIT {
            return Err(format!(
                "ids per unit must be between 1 and {MAX_IDS_PER_UNIT}, got {}",
                self.ids_per_unit
            ));
        }
        if self.snapshot_every == 0 {
            return Err("snapshot cadence must be at least 1 unit".to_string());
        }
        if self.call_timeout.is_zero() {
            return Err("call timeout must be non-zero".to_string());
        }
        Ok(())
    }
}
