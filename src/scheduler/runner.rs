//! Scheduler run loop.
//!
//! [`AnalysisScheduler`] owns the consumer side of the shared ring buffer.
//! It waits until one analysis window of audio has been captured, then on
//! every tick reads the most recent window, derives [`LevelStats`] and hands
//! them to a [`Publisher`].  Failed ticks are logged and retried after
//! `retry_delay`; they never end the loop.  Only the shutdown signal does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::audio::{CaptureStats, LevelAnalyzer, LevelStats, SharedRingBuffer};
use crate::config::AudioConfig;
use crate::publish::{PublishError, Publisher};

use super::state::{SchedulerState, Warmup};

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Timing of the run loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Audio analysed per tick; also the warm-up length.
    pub analysis_window: Duration,
    /// Wait between ticks once active.
    pub publish_interval: Duration,
    /// Wait between checks while warming up.
    pub warmup_poll: Duration,
    /// Wait after a failed tick.
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            analysis_window: Duration::from_secs(10),
            publish_interval: Duration::from_secs(5),
            warmup_poll: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Timing from a validated [`AudioConfig`].
    pub fn from_audio(audio: &AudioConfig) -> Self {
        Self {
            analysis_window: Duration::from_secs_f64(audio.analysis_window_secs),
            publish_interval: Duration::from_secs_f64(audio.publish_interval_secs),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// TickOutcome
// ---------------------------------------------------------------------------

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Still inside the warm-up period; nothing was read.
    WarmingUp,
    /// The window held too little audio to analyse.
    NoData,
    /// Stats were derived and published.
    Published(LevelStats),
}

// ---------------------------------------------------------------------------
// AnalysisScheduler
// ---------------------------------------------------------------------------

pub struct AnalysisScheduler {
    config: SchedulerConfig,
    buffer: SharedRingBuffer,
    analyzer: LevelAnalyzer,
    stats: Arc<CaptureStats>,
    publisher: Arc<dyn Publisher>,
    warmup: Warmup,
    state_tx: watch::Sender<SchedulerState>,
    ticks: u64,
    published: u64,
}

impl AnalysisScheduler {
    /// Create a scheduler for a stream that started at `stream_start`.
    ///
    /// # Arguments
    ///
    /// * `buffer`: ring buffer filled by the capture handler.
    /// * `analyzer`: must use the buffer's sample rate.
    /// * `stats`: counters shared with the capture handler.
    /// * `publisher`: sink for each cycle's stats.
    pub fn new(
        config: SchedulerConfig,
        buffer: SharedRingBuffer,
        analyzer: LevelAnalyzer,
        stats: Arc<CaptureStats>,
        publisher: Arc<dyn Publisher>,
        stream_start: Instant,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::WarmingUp);
        Self {
            warmup: Warmup::new(stream_start, config.analysis_window),
            config,
            buffer,
            analyzer,
            stats,
            publisher,
            state_tx,
            ticks: 0,
            published: 0,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Number of successful publications so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Run one cycle as of `now`.
    ///
    /// # Errors
    ///
    /// Whatever the publisher returns, or [`PublishError::Task`] if it
    /// panicked.  The scheduler stays usable.
    pub async fn tick(&mut self, now: Instant) -> Result<TickOutcome, PublishError> {
        self.ticks += 1;

        if self.state() == SchedulerState::WarmingUp {
            if !self.warmup.is_complete(now) {
                log::debug!(
                    "scheduler: warming up, {:.1}s until first analysis",
                    self.warmup.remaining(now).as_secs_f64()
                );
                return Ok(TickOutcome::WarmingUp);
            }
            log::info!("audio buffer ready, starting publications");
            self.set_state(SchedulerState::Active);
        }

        let window = self
            .buffer
            .read_recent(self.config.analysis_window.as_secs_f64());
        let Some(levels) = self.analyzer.analyze(&window, self.stats.overflow_count()) else {
            log::debug!(
                "scheduler: tick {} had too little audio ({} samples)",
                self.ticks,
                window.len()
            );
            return Ok(TickOutcome::NoData);
        };

        // A panicking sink takes down only this task, not the scheduler.
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move { publisher.publish(&levels).await }).await??;
        self.published += 1;
        log::debug!("scheduler: tick {} published {levels:?}", self.ticks);
        Ok(TickOutcome::Published(levels))
    }

    /// Tick until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Returns the number of successful publications.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        log::info!(
            "scheduler: analysing {:.1}s windows every {:.1}s",
            self.config.analysis_window.as_secs_f64(),
            self.config.publish_interval.as_secs_f64()
        );

        while !*shutdown.borrow() {
            let delay = match self.tick(Instant::now()).await {
                Ok(TickOutcome::WarmingUp) => self.config.warmup_poll,
                Ok(_) => self.config.publish_interval,
                Err(e) => {
                    log::error!("scheduler: cycle failed: {e}");
                    self.config.retry_delay
                }
            };

            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        self.set_state(SchedulerState::Stopped);
        log::info!("scheduler: stopped after {} publications", self.published);
        self.published
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("scheduler: {} -> {}", previous.label(), state.label());
        }
    }
}

/// Sleep for `delay` unless shutdown is requested first.
///
/// Returns `true` when the caller should stop.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            Err(_) => true,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
