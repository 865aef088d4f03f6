//! Periodic progress lines for long harvest batches.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_RUN_DURATION: Duration = Duration::from_secs(30);

/// Progress of the current batch.
#[derive(Debug, Clone)]
pub struct RunProgress {
    /// Units processed in this batch
    pub units_done: u64,
    /// Units the batch aims for
    pub units_target: u64,
    /// Records appended in this batch
    pub records: u64,
    /// Batch start
    pub start_time: Instant,
    /// Last emitted update
    pub last_update: Instant,
    /// Minimum interval between time-based updates
    pub update_interval: Duration,
    /// Last reported completion percentage
    pub last_reported_percentage: f64,
    /// Minimum percentage delta that triggers an update
    pub min_percentage_step: f64,
    /// Current page label (e.g. "page 3")
    pub current_phase: Option<String>,
}

impl RunProgress {
    /// Progress for a batch of `units_target` units
    pub fn new(units_target: u64) -> Self {
        let now = Instant::now();
        Self {
            units_done: 0,
            units_target,
            records: 0,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
            current_phase: None,
        }
    }

    /// Record one finished unit and the records it added
    pub fn unit_done(&mut self, new_records: u64) {
        self.units_done = self.units_done.saturating_add(1);
        self.records = self.records.saturating_add(new_records);
    }

    /// Set descriptive phase label
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(|s| s.into());
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.units_target == 0 {
            return 100.0;
        }
        (self.units_done as f64 / self.units_target as f64 * 100.0).min(100.0)
    }

    /// Units per second since the batch started
    pub fn rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.units_done as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Whether a progress line is due, by percentage jump or by time
    pub fn should_emit_update(&self) -> bool {
        if self.units_done == 0 {
            return false;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }
        self.start_time.elapsed() >= MIN_RUN_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after emitting
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Remaining time estimate from the current rate
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate();
        let remaining = self.units_target.saturating_sub(self.units_done);
        if rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        }
    }

    /// Human-readable progress line
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} units, {} new records - {:.1}% complete",
            self.units_done,
            self.units_target,
            self.records,
            self.percentage()
        )];
        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }
        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
