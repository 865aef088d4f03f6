//! Sliding-window request budgets
//!
//! A [`BudgetTracker`] keeps one [`RequestWindow`] per (duration, capacity)
//! pair the remote API enforces, independently for each [`EndpointClass`].
//! Admission is optimistic and local: a request is recorded only when every
//! window has room. Server-reported violations are handled separately by
//! [`BudgetTracker::on_rate_limit_response`], which blocks the class until
//! the server's hint has elapsed.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::config::{default_windows, MAX_SERVER_HINT_SECS};

/// Logical endpoint class; each class has an independent budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Anything not covered by a more specific class
    Default,
    /// Ladder listing endpoints
    League,
    /// Match list and match detail endpoints
    Match,
    /// Summoner/account lookups
    Account,
}

impl EndpointClass {
    /// All classes, in a fixed order
    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::Default,
        EndpointClass::League,
        EndpointClass::Match,
        EndpointClass::Account,
    ];

    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::League => "league",
            Self::Match => "match",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity and length of one sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Maximum admitted requests within any trailing `duration`
    pub capacity: usize,
    /// Look-back length
    pub duration: Duration,
}

impl WindowSpec {
    /// Create a window spec
    pub fn new(capacity: usize, duration: Duration) -> Self {
        Self { capacity, duration }
    }
}

/// Timestamps of admitted requests within one window's look-back.
///
/// Invariant: after [`purge`](Self::purge) no retained timestamp is older
/// than the window duration, and the tracker never records into a window
/// holding `capacity` timestamps.
#[derive(Debug, Clone)]
pub struct RequestWindow {
    spec: WindowSpec,
    stamps: VecDeque<Instant>,
}

impl RequestWindow {
    /// Empty window
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            stamps: VecDeque::with_capacity(spec.capacity.min(1024)),
        }
    }

    /// Window spec
    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Number of retained timestamps
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Whether the window holds no timestamps
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Drop timestamps that have left the look-back.
    pub fn purge(&mut self, now: Instant) {
        let before = self.stamps.len();
        while let Some(&front) = self.stamps.front() {
            if now.saturating_duration_since(front) >= self.spec.duration {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        let purged = before - self.stamps.len();
        if purged > 0 {
            trace!(
                purged,
                remaining = self.stamps.len(),
                window_secs = self.spec.duration.as_secs_f64(),
                "Purged expired request timestamps"
            );
        }
    }

    /// Whether one more request fits
    pub fn has_room(&self) -> bool {
        self.stamps.len() < self.spec.capacity
    }

    /// Time until the earliest retained timestamp expires
    pub fn time_until_slot(&self, now: Instant) -> Duration {
        self.stamps
            .front()
            .map(|&front| (front + self.spec.duration).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn record(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }
}

/// Budget state for one endpoint class.
#[derive(Debug, Clone)]
struct ClassBudget {
    windows: Vec<RequestWindow>,
    blocked_until: Option<Instant>,
}

/// Per-instance request budget across endpoint classes.
///
/// Owned by exactly one harvester; there is no sharing between instances.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    classes: HashMap<EndpointClass, ClassBudget>,
    max_hint: Duration,
}

impl BudgetTracker {
    /// Tracker applying the same windows to every endpoint class
    ///
    /// # Errors
    /// Returns an error if no window is given or a window has zero capacity
    /// or zero duration.
    pub fn new(specs: &[WindowSpec]) -> Result<Self, RateLimitError> {
        validate_specs(specs)?;
        let classes = EndpointClass::ALL
            .iter()
            .map(|&class| {
                (
                    class,
                    ClassBudget {
                        windows: specs.iter().copied().map(RequestWindow::new).collect(),
                        blocked_until: None,
                    },
                )
            })
            .collect();

        Ok(Self {
            classes,
            max_hint: Duration::from_secs(MAX_SERVER_HINT_SECS),
        })
    }

    /// Tracker with the default short/long windows for `keys` API keys
    pub fn for_keys(keys: usize) -> Self {
        let classes = EndpointClass::ALL
            .iter()
            .map(|&class| {
                (
                    class,
                    ClassBudget {
                        windows: default_windows(keys)
                            .into_iter()
                            .map(RequestWindow::new)
                            .collect(),
                        blocked_until: None,
                    },
                )
            })
            .collect();

        Self {
            classes,
            max_hint: Duration::from_secs(MAX_SERVER_HINT_SECS),
        }
    }

    /// Replace the windows of one class
    pub fn with_class_windows(
        mut self,
        class: EndpointClass,
        specs: &[WindowSpec],
    ) -> Result<Self, RateLimitError> {
        validate_specs(specs)?;
        self.classes.insert(
            class,
            ClassBudget {
                windows: specs.iter().copied().map(RequestWindow::new).collect(),
                blocked_until: None,
            },
        );
        Ok(self)
    }

    /// Override the clamp applied to server hints
    pub fn with_max_hint(mut self, max_hint: Duration) -> Self {
        self.max_hint = max_hint;
        self
    }

    /// Request admission for one call of `class`.
    ///
    /// Returns zero and records the request when every window has room.
    /// Otherwise returns how long to wait before asking again, and records
    /// nothing.
    pub fn admit(&mut self, class: EndpointClass) -> Duration {
        self.admit_at(class, Instant::now())
    }

    /// [`admit`](Self::admit) at an explicit instant
    pub fn admit_at(&mut self, class: EndpointClass, now: Instant) -> Duration {
        let budget = self.classes.entry(class).or_insert_with(|| ClassBudget {
            windows: default_windows(1).into_iter().map(RequestWindow::new).collect(),
            blocked_until: None,
        });

        if let Some(until) = budget.blocked_until {
            if until > now {
                let wait = until - now;
                trace!(class = %class, wait_ms = wait.as_millis() as u64, "Class blocked after server rate limit");
                return wait;
            }
            budget.blocked_until = None;
        }

        let mut wait = Duration::ZERO;
        for window in &mut budget.windows {
            window.purge(now);
            if !window.has_room() {
                wait = wait.max(window.time_until_slot(now));
            }
        }

        if wait.is_zero() {
            for window in &mut budget.windows {
                window.record(now);
            }
            trace!(class = %class, "Request admitted");
        } else {
            debug!(
                class = %class,
                wait_ms = wait.as_millis() as u64,
                "Request budget exhausted, admission deferred"
            );
        }
        wait
    }

    /// React to a server-reported rate violation for `class`.
    ///
    /// With a hint, returns it clamped to the configured maximum. Without a
    /// hint returns `None`: the delay is then the retry policy's decision.
    /// Either way the class is treated as saturated from now on: it stays
    /// blocked for the returned hint, or for its shortest window when there
    /// is none.
    pub fn on_rate_limit_response(
        &mut self,
        class: EndpointClass,
        hint: Option<Duration>,
    ) -> Option<Duration> {
        self.on_rate_limit_response_at(class, hint, Instant::now())
    }

    /// [`on_rate_limit_response`](Self::on_rate_limit_response) at an explicit instant
    pub fn on_rate_limit_response_at(
        &mut self,
        class: EndpointClass,
        hint: Option<Duration>,
        now: Instant,
    ) -> Option<Duration> {
        let clamped = hint.map(|h| {
            if h > self.max_hint {
                warn!(
                    class = %class,
                    hint_secs = h.as_secs_f64(),
                    max_secs = self.max_hint.as_secs_f64(),
                    "Server rate-limit hint exceeds maximum, clamping"
                );
            }
            h.min(self.max_hint)
        });

        if let Some(budget) = self.classes.get_mut(&class) {
            let penalty = clamped.unwrap_or_else(|| {
                budget
                    .windows
                    .iter()
                    .map(|w| w.spec.duration)
                    .min()
                    .unwrap_or(Duration::ZERO)
            });
            let until = now + penalty;
            budget.blocked_until = Some(budget.blocked_until.map_or(until, |b| b.max(until)));
        }

        clamped
    }

    /// Retained timestamps per window of `class`, shortest window first
    pub fn window_usage(&self, class: EndpointClass) -> Vec<(WindowSpec, usize)> {
        self.classes
            .get(&class)
            .map(|b| b.windows.iter().map(|w| (w.spec(), w.len())).collect())
            .unwrap_or_default()
    }

    /// Admit `class`, sleeping until the budget allows it.
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&mut self, class: EndpointClass) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let wait = self.admit(class);
            if wait.is_zero() {
                return waited;
            }
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }
}

fn validate_specs(specs: &[WindowSpec]) -> Result<(), RateLimitError> {
    if specs.is_empty() {
        return Err(RateLimitError::InvalidWindow(
            "at least one window is required".to_string(),
        ));
    }
    for spec in specs {
        if spec.capacity == 0 {
            return Err(RateLimitError::InvalidWindow(format!(
                "window of {:?} has zero capacity",
                spec.duration
            )));
        }
        if spec.duration.is_zero() {
            return Err(RateLimitError::InvalidWindow(format!(
                "window of capacity {} has zero duration",
                spec.capacity
            )));
        }
    }
    Ok(())
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Window configuration rejected
    #[error("invalid rate window: {0}")]
    InvalidWindow(String),
}
