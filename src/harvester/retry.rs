//! Failure classification and retry decisions
//!
//! Every remote call runs through a small state machine:
//! `Attempting -> Retry(wait) -> Attempting -> ... -> Success | GiveUp`.
//! [`RetryPolicy::next_action`] is the only place that decides which edge to
//! take after a failure.

use std::fmt;
use std::time::Duration;

use super::config::{calculate_backoff, BASE_BACKOFF_MS, MAX_BACKOFF_MS, MAX_TRANSIENT_ATTEMPTS};

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The server reported a budget violation (HTTP 429)
    RateLimited,
    /// Server errors, network faults and timeouts; worth retrying a bounded number of times
    Transient,
    /// Client errors and unparseable responses; retrying cannot help
    Fatal,
}

impl ErrorClass {
    /// User-facing description used in retry log lines
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate limit exceeded",
            Self::Transient => "transient failure",
            Self::Fatal => "fatal failure",
        }
    }

    /// Suggested remediation shown alongside a final failure
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::RateLimited => "Run fewer partitions at once or wait before restarting",
            Self::Transient => "Check network connectivity and the API status page",
            Self::Fatal => "Verify the API key and that the requested entity exists",
        }
    }

    /// Lowercase label used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Why a call was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// A fatal error; the item is skipped
    Fatal,
    /// Too many transient failures in a row
    AttemptsExhausted {
        /// Attempts made, including the last one
        attempts: u32,
    },
    /// A stop signal interrupted a rate-limit wait
    Aborted,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal error"),
            Self::AttemptsExhausted { attempts } => {
                write!(f, "gave up after {attempts} attempts")
            }
            Self::Aborted => write!(f, "aborted by stop signal"),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then attempt again
    Retry(Duration),
    /// Abandon the call
    GiveUp(GiveUpReason),
}

/// States of one guarded call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallState<T> {
    /// An attempt is in flight
    Attempting,
    /// Waiting before the next attempt
    Retry(Duration),
    /// Terminal: the call produced a value
    Success(T),
    /// Terminal: the call was abandoned
    GiveUp(GiveUpReason),
}

impl<T> CallState<T> {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::GiveUp(_))
    }
}

/// Backoff and attempt limits for classified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First transient backoff delay
    pub base_backoff: Duration,
    /// Ceiling on transient backoff delays
    pub max_backoff: Duration,
    /// Transient attempts before giving up
    pub max_transient_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            max_transient_attempts: MAX_TRANSIENT_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Policy with explicit limits
    pub fn new(base_backoff: Duration, max_backoff: Duration, max_transient_attempts: u32) -> Self {
        Self {
            base_backoff,
            max_backoff,
            max_transient_attempts,
        }
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    ///
    /// For `Transient`, `attempt` is the count of consecutive transient
    /// failures of this call; for `RateLimited`, the count of consecutive
    /// rate-limit responses. `server_wait` is the (already clamped) wait the
    /// server asked for.
    ///
    /// Rate-limited calls are never abandoned by attempt count. The server's
    /// hint wins; without one the backoff grows with the streak up to
    /// `max_backoff`.
    pub fn next_action(
        &self,
        class: ErrorClass,
        attempt: u32,
        server_wait: Option<Duration>,
    ) -> RetryDecision {
        match class {
            ErrorClass::Fatal => RetryDecision::GiveUp(GiveUpReason::Fatal),
            ErrorClass::Transient => {
                if attempt >= self.max_transient_attempts {
                    RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted { attempts: attempt })
                } else {
                    RetryDecision::Retry(calculate_backoff(
                        attempt,
                        self.base_backoff,
                        self.max_backoff,
                    ))
                }
            }
            ErrorClass::RateLimited => RetryDecision::Retry(server_wait.unwrap_or_else(|| {
                calculate_backoff(attempt, self.base_backoff, self.max_backoff)
            })),
        }
    }
}

/// Running record of one guarded call, used for log formatting.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// What is being attempted (e.g. "match detail KR_123")
    pub operation: String,
    /// Attempts made so far
    pub attempt: u32,
    /// Consecutive transient failures
    pub transient_failures: u32,
    /// Consecutive rate-limit responses
    pub rate_limited: u32,
    /// Classification of the most recent failure
    pub last_class: Option<ErrorClass>,
    /// Message of the most recent failure
    pub last_error: String,
    /// Wait before the next attempt
    pub next_delay: Duration,
    /// Transient attempt limit, for display
    pub max_transient_attempts: u32,
}

impl RetryContext {
    /// Fresh context for `operation`
    pub fn new(operation: impl Into<String>, max_transient_attempts: u32) -> Self {
        Self {
            operation: operation.into(),
            attempt: 0,
            transient_failures: 0,
            rate_limited: 0,
            last_class: None,
            last_error: String::new(),
            next_delay: Duration::ZERO,
            max_transient_attempts,
        }
    }

    /// Record a failure and return the streak count relevant to its class
    pub fn record_failure(&mut self, class: ErrorClass, message: impl Into<String>) -> u32 {
        self.last_class = Some(class);
        self.last_error = message.into();
        match class {
            ErrorClass::RateLimited => {
                self.rate_limited += 1;
                self.rate_limited
            }
            ErrorClass::Transient => {
                // A rate-limit response in between does not reset the transient count
                self.transient_failures += 1;
                self.transient_failures
            }
            ErrorClass::Fatal => self.attempt,
        }
    }

    /// Single-line message logged before waiting for the next attempt
    pub fn format_retry(&self) -> String {
        let description = self
            .last_class
            .map(|c| c.description())
            .unwrap_or("unknown error");
        match self.last_class {
            Some(ErrorClass::RateLimited) => format!(
                "Rate limited (response {} in a row) - waiting {:.1} seconds... ({})",
                self.rate_limited,
                self.next_delay.as_secs_f64(),
                self.operation
            ),
            _ => format!(
                "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
                self.transient_failures + 1,
                self.max_transient_attempts,
                description,
                self.next_delay.as_secs_f64(),
                self.operation
            ),
        }
    }

    /// Multi-line summary logged when the call is abandoned
    pub fn format_failure(&self, reason: GiveUpReason) -> String {
        let mut lines = vec![
            format!("[SKIPPED] {} ({reason})", self.operation),
            format!("  Last error: {}", self.last_error),
            format!("  Attempts: {}", self.attempt),
        ];
        if let Some(class) = self.last_class {
            lines.push(format!("  Suggestion: {}", class.suggestion()));
        }
        lines.join("\n")
    }
}
