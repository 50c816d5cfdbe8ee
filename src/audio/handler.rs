//! The block handler every capture source drives.
//!
//! [`CaptureHandler::on_block`] runs on the audio thread once per device
//! block.  It must return quickly, so all it does is:
//!
//! 1. bump the overflow counter when the source flags a dropped block,
//! 2. collapse the block to mono (reusing a scratch vector),
//! 3. copy the mono samples into the [`SharedRingBuffer`].
//!
//! It never waits on the analysis side; if analysis lags, old audio is
//! simply overwritten.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use super::buffer::SharedRingBuffer;
use super::downmix::downmix_into;

/// Frames preallocated for the mono scratch buffer (about 0.17 s at 48 kHz).
const SCRATCH_FRAMES: usize = 8_192;

// ---------------------------------------------------------------------------
// CaptureStats
// ---------------------------------------------------------------------------

/// Status shared between the capture thread and the rest of the process.
///
/// All accessors are lock-free atomics.  The overflow counter only ever
/// increases; the frame total lives in the ring buffer.
#[derive(Debug, Default)]
pub struct CaptureStats {
    overflows: AtomicU64,
    failed: AtomicBool,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Overflowed blocks since start-up.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Flag the stream as dead.  Set from the stream error callback.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// CaptureHandler
// ---------------------------------------------------------------------------

/// Real-time block handler registered with a [`CaptureSource`].
///
/// [`CaptureSource`]: crate::audio::CaptureSource
pub struct CaptureHandler {
    buffer: SharedRingBuffer,
    stats: Arc<CaptureStats>,
    channels: usize,
    mono: Vec<f32>,
}

impl CaptureHandler {
    /// Build a handler for interleaved blocks with `channels` channels.
    pub fn new(buffer: SharedRingBuffer, stats: Arc<CaptureStats>, channels: u16) -> Self {
        let channels = channels as usize;
        let mono = if channels > 1 {
            Vec::with_capacity(SCRATCH_FRAMES)
        } else {
            Vec::new()
        };
        Self {
            buffer,
            stats,
            channels,
            mono,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    /// Handle one device block.
    ///
    /// `samples` is interleaved, `frame_count` is the number of frames the
    /// device claims to have delivered.  Only complete frames present in
    /// `samples` are stored.
    pub fn on_block(&mut self, samples: &[f32], frame_count: usize, overflow: bool) {
        if overflow {
            self.stats.record_overflow();
        }
        if self.channels == 0 {
            return;
        }

        let frames = frame_count.min(samples.len() / self.channels);
        let block = &samples[..frames * self.channels];

        if self.channels == 1 {
            self.buffer.write(block);
        } else {
            downmix_into(block, self.channels, &mut self.mono);
            self.buffer.write(&self.mono);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
