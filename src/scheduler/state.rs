//! Scheduler state machine.
//!
//! ```text
//! WarmingUp ──window of audio captured──▶ Active
//! any state ──shutdown──────────────────▶ Stopped
//! ```

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// SchedulerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// Less than one analysis window has elapsed since the stream started.
    #[default]
    WarmingUp,

    /// Analysing and publishing every publish interval.
    Active,

    /// The run loop has returned.
    Stopped,
}

impl SchedulerState {
    /// A short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            SchedulerState::WarmingUp => "warming up",
            SchedulerState::Active => "active",
            SchedulerState::Stopped => "stopped",
        }
    }
}

// ---------------------------------------------------------------------------
// Warmup
// ---------------------------------------------------------------------------

/// Tracks whether a full analysis window has been captured.
#[derive(Debug, Clone, Copy)]
pub struct Warmup {
    stream_start: Instant,
    window: Duration,
}

impl Warmup {
    pub fn new(stream_start: Instant, window: Duration) -> Self {
        Self {
            stream_start,
            window,
        }
    }

    /// `true` once `now - stream_start >= window`.  A `now` earlier than the
    /// stream start counts as zero elapsed.
    pub fn is_complete(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stream_start) >= self.window
    }

    /// Time left until the window is full.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.saturating_duration_since(self.stream_start))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_warming_up() {
        assert_eq!(SchedulerState::default(), SchedulerState::WarmingUp);
    }

    #[test]
    fn labels() {
        assert_eq!(SchedulerState::WarmingUp.label(), "warming up");
        assert_eq!(SchedulerState::Active.label(), "active");
        assert_eq!(SchedulerState::Stopped.label(), "stopped");
    }

    #[test]
    fn warmup_completes_at_exactly_one_window() {
        let start = Instant::now();
        let warmup = Warmup::new(start, Duration::from_secs(10));

        assert!(!warmup.is_complete(start));
        assert!(!warmup.is_complete(start + Duration::from_secs(5)));
        assert!(warmup.is_complete(start + Duration::from_secs(10)));
        assert!(warmup.is_complete(start + Duration::from_secs(11)));
    }

    #[test]
    fn remaining_counts_down_to_zero() {
        let start = Instant::now();
        let warmup = Warmup::new(start, Duration::from_secs(10));

        assert_eq!(warmup.remaining(start + Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(warmup.remaining(start + Duration::from_secs(30)), Duration::ZERO);
    }
}
