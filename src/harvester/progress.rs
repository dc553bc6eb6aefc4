//! Periodic progress lines for the fetch phase.
//!
//! The engine feeds every completion into a [`ProgressState`] and logs
//! [`ProgressState::format_progress`] whenever another 10% of the work set
//! finished or the update interval elapsed.

use std::time::{Duration, Instant};

/// Progress of the fetch phase of one run.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Completions so far (any outcome).
    pub completed: u64,
    /// Size of the work set.
    pub total: u64,
    /// When the fetch phase started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between time-based updates.
    pub update_interval: Duration,
    /// Completions per second since start.
    pub current_rate: f64,
    /// Percentage at the last emitted update.
    pub last_reported_percentage: f64,
    /// Percentage delta that forces an update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Track a work set of `total` items.
    pub fn new(total: u64, update_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            completed: 0,
            total,
            start_time: now,
            last_update: now,
            update_interval,
            current_rate: 0.0,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Count one more completion.
    pub fn update(&mut self, completions: u64) {
        self.completed = self.completed.saturating_add(completions);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.completed as f64 / elapsed;
        }
    }

    /// Whether a progress line is due.
    pub fn should_emit_update(&self) -> bool {
        if self.completed == 0 {
            return false;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }
        self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after a line was logged.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }

    /// Remaining time at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let remaining = self.total.saturating_sub(self.completed);
        if self.current_rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / self.current_rate))
        } else {
            None
        }
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} items - {:.1}% complete",
            self.completed,
            self.total,
            self.percentage()
        )];

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.1} items/sec", self.current_rate));
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
