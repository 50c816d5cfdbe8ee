//! Fixed-capacity circular buffer holding the most recent mono audio.
//!
//! The buffer is allocated once, zero-filled, and never resized.  Writes
//! overwrite the oldest samples once the cursor wraps, so the newest
//! `capacity` samples are always addressable.  Readers receive an owned copy
//! ([`AnalysisWindow`]) and never alias the storage.
//!
//! [`SharedRingBuffer`] is the handle shared between the capture callback
//! and the analysis scheduler.  A single mutex guards both directions and is
//! held only while samples are copied in or out.
//!
//! # Example
//!
//! ```rust
//! use noise_meter::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4, 4);
//! buf.write(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 samples into capacity 4
//! assert_eq!(buf.read_recent(1.0), vec![2.0, 3.0, 4.0, 5.0]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Owned copy of the most recent samples, oldest first.
pub type AnalysisWindow = Vec<f32>;

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular store of mono `f32` samples.
///
/// ## Oversized writes
///
/// A single [`write`](Self::write) larger than `capacity` keeps only the
/// newest `capacity` samples.  The cursor still advances by the full block
/// length so later reads line up with the stream position, and the number
/// of discarded samples is returned.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<f32>,
    sample_rate: u32,
    /// Index of the *next* write position, always in `[0, capacity)`.
    write_cursor: usize,
    /// Every frame ever handed to `write`, including truncated ones.
    total_frames: u64,
}

impl RingBuffer {
    /// Create a zero-filled buffer of `capacity` samples recorded at
    /// `sample_rate` Hz.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` or `sample_rate == 0`.
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        assert!(sample_rate > 0, "RingBuffer sample rate must be > 0");
        Self {
            buf: vec![0.0; capacity],
            sample_rate,
            write_cursor: 0,
            total_frames: 0,
        }
    }

    /// Create a buffer holding `seconds` of audio at `sample_rate` Hz.
    ///
    /// The capacity is `round(sample_rate × seconds)`, never less than one.
    pub fn with_duration(sample_rate: u32, seconds: f64) -> Self {
        let capacity = (sample_rate as f64 * seconds).round().max(1.0) as usize;
        Self::new(capacity, sample_rate)
    }

    /// Append `samples` at the write cursor, wrapping around the end of the
    /// store.
    ///
    /// Returns the number of samples that were discarded because the block
    /// exceeded `capacity` (zero in the normal case).
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let frames = samples.len();
        if frames == 0 {
            return 0;
        }

        let capacity = self.buf.len();
        let dropped = frames.saturating_sub(capacity);
        let kept = &samples[dropped..];

        // Skipping the dropped prefix keeps the final cursor at
        // (cursor + frames) % capacity.
        let start = (self.write_cursor + dropped) % capacity;
        let end = start + kept.len();

        if end <= capacity {
            self.buf[start..end].copy_from_slice(kept);
        } else {
            let head = capacity - start;
            self.buf[start..].copy_from_slice(&kept[..head]);
            self.buf[..end - capacity].copy_from_slice(&kept[head..]);
        }

        self.write_cursor = end % capacity;
        self.total_frames += frames as u64;
        dropped
    }

    /// Copy the most recent `seconds` of audio, oldest sample first.
    ///
    /// Returns an empty window when `seconds` is not a positive finite
    /// number or when nothing has been written yet.  Requests longer than the buffer
    /// are capped at `capacity` samples.
    pub fn read_recent(&self, seconds: f64) -> AnalysisWindow {
        if !seconds.is_finite() || seconds <= 0.0 || self.total_frames == 0 {
            return Vec::new();
        }
        let wanted = (seconds * self.sample_rate as f64).round() as usize;
        self.read_latest(wanted)
    }

    /// Copy the newest `count` samples (capped at `capacity`), oldest first.
    ///
    /// Unlike [`read_recent`](Self::read_recent) this does not check whether
    /// any audio has arrived; unwritten positions read back as zeros.
    pub fn read_latest(&self, count: usize) -> AnalysisWindow {
        let capacity = self.buf.len();
        let needed = count.min(capacity);
        if needed == 0 {
            return Vec::new();
        }

        let cursor = self.write_cursor;
        let start = (cursor + capacity - needed) % capacity;

        if start < cursor {
            self.buf[start..cursor].to_vec()
        } else {
            let mut window = Vec::with_capacity(needed);
            window.extend_from_slice(&self.buf[start..]);
            window.extend_from_slice(&self.buf[..cursor]);
            window
        }
    }

    /// Number of addressable samples.  Always equal to `capacity`.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Always `false`: the store is zero-filled at construction.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Length of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.buf.len() as f64 / self.sample_rate as f64
    }
}

// ---------------------------------------------------------------------------
// SharedRingBuffer
// ---------------------------------------------------------------------------

/// Thread-safe handle to a [`RingBuffer`], cheap to clone.
///
/// The capture callback calls [`write`](Self::write); the scheduler calls
/// [`read_recent`](Self::read_recent).  Both only copy under the lock, so
/// the audio thread is never blocked for longer than one memcpy.
#[derive(Debug, Clone)]
pub struct SharedRingBuffer {
    inner: Arc<Mutex<RingBuffer>>,
    capacity: usize,
    sample_rate: u32,
}

impl SharedRingBuffer {
    pub fn new(buffer: RingBuffer) -> Self {
        let capacity = buffer.capacity();
        let sample_rate = buffer.sample_rate();
        Self {
            inner: Arc::new(Mutex::new(buffer)),
            capacity,
            sample_rate,
        }
    }

    /// Shorthand for `SharedRingBuffer::new(RingBuffer::with_duration(..))`.
    pub fn with_duration(sample_rate: u32, seconds: f64) -> Self {
        Self::new(RingBuffer::with_duration(sample_rate, seconds))
    }

    /// See [`RingBuffer::write`].
    pub fn write(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        self.lock().write(samples)
    }

    /// See [`RingBuffer::read_recent`].  The lock is held for the whole copy,
    /// so the result is never torn by a concurrent write.
    pub fn read_recent(&self, seconds: f64) -> AnalysisWindow {
        self.lock().read_recent(seconds)
    }

    /// See [`RingBuffer::read_latest`].
    pub fn read_latest(&self, count: usize) -> AnalysisWindow {
        self.lock().read_latest(count)
    }

    pub fn total_frames(&self) -> u64 {
        self.lock().total_frames()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    // A panic while holding the lock cannot leave the samples in an invalid
    // state, so a poisoned mutex is simply recovered.
    fn lock(&self) -> MutexGuard<'_, RingBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|v| v as f32).collect()
    }

    // ---- Capacity ----------------------------------------------------------

    #[test]
    fn capacity_is_constant_across_writes() {
        let mut buf = RingBuffer::new(8, 8);
        assert_eq!(buf.len(), 8);

        for block in [0usize, 3, 8, 5, 13, 1] {
            buf.write(&vec![0.5; block]);
            assert_eq!(buf.len(), 8);
            assert!(buf.write_cursor() < buf.capacity());
        }
    }

    #[test]
    fn with_duration_rounds_capacity() {
        let buf = RingBuffer::with_duration(44_100, 0.5);
        assert_eq!(buf.capacity(), 22_050);
        assert!((buf.duration_secs() - 0.5).abs() < 1e-9);

        let tiny = RingBuffer::with_duration(10, 0.01);
        assert_eq!(tiny.capacity(), 1);
    }

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf = RingBuffer::new(0, 48_000);
    }

    // ---- Wraparound --------------------------------------------------------

    #[test]
    fn wraparound_keeps_last_capacity_samples_in_order() {
        let mut buf = RingBuffer::new(10, 10);
        buf.write(&ramp(0, 7));
        buf.write(&ramp(7, 6)); // 13 total, wraps by 3

        assert_eq!(buf.write_cursor(), 3);
        assert_eq!(buf.read_latest(10), ramp(3, 10));
    }

    #[test]
    fn many_small_writes_wrap_correctly() {
        let mut buf = RingBuffer::new(16, 16);
        let mut next = 0;
        for len in [3, 5, 7, 2, 9, 4] {
            buf.write(&ramp(next, len));
            next += len;
        }
        assert_eq!(buf.total_frames(), next as u64);
        assert_eq!(buf.read_latest(16), ramp(next - 16, 16));
    }

    #[test]
    fn zeros_then_ones_read_back_in_order() {
        let mut buf = RingBuffer::new(1000, 100);
        buf.write(&[0.0; 600]);
        buf.write(&[1.0; 600]);

        let window = buf.read_recent(10.0);
        assert_eq!(window.len(), 1000);
        assert!(window[..400].iter().all(|&s| s == 0.0));
        assert!(window[400..].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn partial_read_without_wrap_is_contiguous() {
        let mut buf = RingBuffer::new(100, 10);
        buf.write(&ramp(0, 50));
        assert_eq!(buf.read_recent(2.0), ramp(30, 20));
    }

    #[test]
    fn partial_read_across_the_seam() {
        let mut buf = RingBuffer::new(10, 10);
        buf.write(&ramp(0, 12)); // cursor = 2
        assert_eq!(buf.read_latest(4), ramp(8, 4));
    }

    // ---- Oversized blocks --------------------------------------------------

    #[test]
    fn oversized_block_keeps_newest_samples() {
        let mut buf = RingBuffer::new(4, 4);
        buf.write(&[9.0]); // cursor = 1

        let dropped = buf.write(&ramp(0, 10));
        assert_eq!(dropped, 6);
        assert_eq!(buf.total_frames(), 11);
        assert_eq!(buf.write_cursor(), 11 % 4);
        assert_eq!(buf.read_latest(4), ramp(6, 4));
    }

    #[test]
    fn block_of_exact_capacity_drops_nothing() {
        let mut buf = RingBuffer::new(5, 5);
        buf.write(&[1.0, 1.0]);
        assert_eq!(buf.write(&ramp(0, 5)), 0);
        assert_eq!(buf.read_latest(5), ramp(0, 5));
    }

    #[test]
    fn writes_after_oversized_block_stay_ordered() {
        let mut buf = RingBuffer::new(6, 6);
        buf.write(&ramp(0, 20));
        buf.write(&ramp(20, 3));
        assert_eq!(buf.read_latest(6), ramp(17, 6));
    }

    // ---- Empty / degenerate input ------------------------------------------

    #[test]
    fn read_before_any_write_is_empty() {
        let buf = RingBuffer::new(10, 10);
        assert!(buf.read_recent(1.0).is_empty());
    }

    #[test]
    fn non_positive_seconds_is_empty() {
        let mut buf = RingBuffer::new(10, 10);
        buf.write(&[0.25; 10]);
        assert!(buf.read_recent(0.0).is_empty());
        assert!(buf.read_recent(-3.0).is_empty());
        assert!(buf.read_recent(f64::NAN).is_empty());
    }

    #[test]
    fn zero_length_write_is_noop() {
        let mut buf = RingBuffer::new(10, 10);
        buf.write(&ramp(0, 4));
        assert_eq!(buf.write(&[]), 0);
        assert_eq!(buf.write_cursor(), 4);
        assert_eq!(buf.total_frames(), 4);
    }

    #[test]
    fn request_longer_than_buffer_is_capped() {
        let mut buf = RingBuffer::new(10, 10);
        buf.write(&ramp(0, 3));
        let window = buf.read_recent(60.0);
        assert_eq!(window.len(), 10);
        // Unwritten positions still hold the initial zero fill.
        assert_eq!(&window[7..], &ramp(0, 3)[..]);
        assert!(window[..7].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn read_rounds_seconds_to_nearest_sample() {
        let mut buf = RingBuffer::new(100, 10);
        buf.write(&ramp(0, 100));
        assert_eq!(buf.read_recent(0.26).len(), 3);
        assert_eq!(buf.read_recent(0.24).len(), 2);
    }

    // ---- Shared handle -----------------------------------------------------

    #[test]
    fn shared_handle_clones_see_same_storage() {
        let shared = SharedRingBuffer::with_duration(10, 1.0);
        let writer = shared.clone();
        writer.write(&ramp(0, 4));

        assert_eq!(shared.total_frames(), 4);
        assert_eq!(shared.read_recent(0.4), ramp(0, 4));
        assert_eq!(shared.capacity(), 10);
        assert_eq!(shared.sample_rate(), 10);
    }

    /// A reader racing a writer must only ever see one contiguous run of
    /// the ramp: consecutive samples always differ by exactly one.
    #[test]
    fn concurrent_reads_are_never_torn() {
        const CAPACITY: usize = 1_000;
        const BLOCK: usize = 64;
        const BLOCKS: usize = 2_000;

        let shared = SharedRingBuffer::new(RingBuffer::new(CAPACITY, 1_000));
        shared.write(&ramp(0, CAPACITY));

        let writer = shared.clone();
        let handle = std::thread::spawn(move || {
            let mut next = CAPACITY;
            for _ in 0..BLOCKS {
                writer.write(&ramp(next, BLOCK));
                next += BLOCK;
            }
        });

        let mut reads = 0;
        while !handle.is_finished() || reads == 0 {
            let window = shared.read_recent(0.5);
            assert_eq!(window.len(), CAPACITY / 2);
            for pair in window.windows(2) {
                assert_eq!(pair[1] - pair[0], 1.0, "torn read: {pair:?}");
            }
            reads += 1;
        }
        handle.join().expect("writer thread panicked");
    }
}
