//! Loudness statistics over a window of mono samples.
//!
//! ## Algorithm
//!
//! The window is split into 100 ms chunks.  Each chunk is DC-centred, its
//! RMS is taken and converted to `20·log10(rms)`.  The minimum and maximum
//! of those chunk levels become `min_db` / `max_db`.  `avg_db` is computed
//! once over the whole window, because RMS values of concatenated chunks do
//! not average losslessly.
//!
//! A trailing chunk shorter than half the target length is dropped so that a
//! handful of samples cannot drag the minimum or maximum around.
//!
//! Levels are relative (uncalibrated) decibels; silence clamps to
//! [`SILENCE_FLOOR_DB`].

use serde::Serialize;

/// Level reported for empty or numerically silent input.
pub const SILENCE_FLOOR_DB: f64 = -80.0;

/// Default chunk length used for min/max levels.
pub const DEFAULT_CHUNK_SECS: f64 = 0.1;

/// RMS at or below this value is treated as silence.
const RMS_EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// decibels
// ---------------------------------------------------------------------------

/// Relative level of `samples` in dB after removing the DC offset.
///
/// Returns [`SILENCE_FLOOR_DB`] for an empty slice or when the centred RMS
/// is `<= 1e-10`.
///
/// ```rust
/// use noise_meter::audio::{decibels, SILENCE_FLOOR_DB};
///
/// assert_eq!(decibels(&[]), SILENCE_FLOOR_DB);
/// assert_eq!(decibels(&[0.0; 64]), SILENCE_FLOOR_DB);
///
/// // Full-scale square wave: RMS = 1.0 → 0 dB
/// let square: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
/// assert!(decibels(&square).abs() < 1e-9);
/// ```
pub fn decibels(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return SILENCE_FLOOR_DB;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
    let mean_sq = samples
        .iter()
        .map(|&s| {
            let centred = s as f64 - mean;
            centred * centred
        })
        .sum::<f64>()
        / n;
    let rms = mean_sq.sqrt();

    // NaN fails the comparison too and lands on the floor.
    if rms > RMS_EPSILON {
        20.0 * rms.log10()
    } else {
        SILENCE_FLOOR_DB
    }
}

// ---------------------------------------------------------------------------
// LevelStats
// ---------------------------------------------------------------------------

/// Result of one analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelStats {
    /// Quietest chunk level in dB.
    pub min_db: f64,
    /// Loudest chunk level in dB.
    pub max_db: f64,
    /// Level of the whole window in dB.
    pub avg_db: f64,
    /// Length of the analysed window in seconds.
    pub duration_secs: f64,
    /// Capture overflows observed since start-up.
    pub overflow_count: u64,
    /// Chunks that contributed to `min_db` / `max_db`.
    pub chunk_count: usize,
}

// ---------------------------------------------------------------------------
// LevelAnalyzer
// ---------------------------------------------------------------------------

/// Chunked-RMS level analyzer for a fixed sample rate.
#[derive(Debug, Clone)]
pub struct LevelAnalyzer {
    sample_rate: u32,
    chunk_len: usize,
}

impl LevelAnalyzer {
    /// Analyzer using the default 100 ms chunks.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_chunk_secs(sample_rate, DEFAULT_CHUNK_SECS)
    }

    /// Analyzer with a custom chunk length.  The chunk is
    /// `round(sample_rate × chunk_secs)` samples, never less than one.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate == 0`.
    pub fn with_chunk_secs(sample_rate: u32, chunk_secs: f64) -> Self {
        assert!(sample_rate > 0, "sample_rate must be > 0");
        let chunk_len = (sample_rate as f64 * chunk_secs).round().max(1.0) as usize;
        Self {
            sample_rate,
            chunk_len,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Target chunk length in samples.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Level of every chunk long enough to count, in window order.
    pub fn chunk_levels(&self, window: &[f32]) -> Vec<f64> {
        let min_len = self.chunk_len / 2;
        window
            .chunks(self.chunk_len)
            .filter(|chunk| chunk.len() >= min_len)
            .map(decibels)
            .collect()
    }

    /// Derive [`LevelStats`] for `window`.
    ///
    /// Returns `None` when the window is empty or no chunk was long enough
    /// to be counted.
    pub fn analyze(&self, window: &[f32], overflow_count: u64) -> Option<LevelStats> {
        if window.is_empty() {
            return None;
        }

        let levels = self.chunk_levels(window);
        if levels.is_empty() {
            return None;
        }

        let min_db = levels.iter().copied().fold(f64::INFINITY, f64::min);
        let max_db = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(LevelStats {
            min_db,
            max_db,
            avg_db: decibels(window),
            duration_secs: window.len() as f64 / self.sample_rate as f64,
            overflow_count,
            chunk_count: levels.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Alternating ±amplitude: zero mean, RMS equal to `amplitude`.
    fn square(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    // ---- decibels ----------------------------------------------------------

    #[test]
    fn empty_and_zero_input_hit_the_floor() {
        assert_eq!(decibels(&[]), SILENCE_FLOOR_DB);
        assert_eq!(decibels(&[0.0; 1_000]), SILENCE_FLOOR_DB);
    }

    #[test]
    fn constant_signal_is_silent_after_dc_removal() {
        assert_eq!(decibels(&[0.7; 480]), SILENCE_FLOOR_DB);
    }

    #[test]
    fn full_period_sine_is_about_minus_three_db() {
        let n = 1_000;
        let sine: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / n as f64).sin() as f32)
            .collect();
        let db = decibels(&sine);
        assert!((db - (-3.0103)).abs() < 0.01, "got {db}");
    }

    #[test]
    fn dc_offset_does_not_change_level() {
        let plain = square(0.1, 200);
        let shifted: Vec<f32> = plain.iter().map(|s| s + 0.5).collect();
        assert!((decibels(&plain) - decibels(&shifted)).abs() < 1e-4);
        assert!((decibels(&plain) - (-20.0)).abs() < 1e-4);
    }

    #[test]
    fn nan_input_degrades_to_floor() {
        assert_eq!(decibels(&[f32::NAN, 0.5, -0.5]), SILENCE_FLOOR_DB);
    }

    // ---- chunking ----------------------------------------------------------

    #[test]
    fn chunk_length_follows_sample_rate() {
        assert_eq!(LevelAnalyzer::new(48_000).chunk_len(), 4_800);
        assert_eq!(LevelAnalyzer::new(44_100).chunk_len(), 4_410);
        assert_eq!(LevelAnalyzer::new(5).chunk_len(), 1);
    }

    #[test]
    fn half_length_tail_chunk_is_kept() {
        // 100 Hz → 10-sample chunks; 1.05 s = 105 samples = 10 full + 5.
        let analyzer = LevelAnalyzer::new(100);
        assert_eq!(analyzer.chunk_levels(&square(0.5, 105)).len(), 11);
    }

    #[test]
    fn short_tail_chunk_is_dropped() {
        let analyzer = LevelAnalyzer::new(100);
        assert_eq!(analyzer.chunk_levels(&square(0.5, 104)).len(), 10);
    }

    // ---- analyze -----------------------------------------------------------

    #[test]
    fn empty_window_has_no_stats() {
        assert_eq!(LevelAnalyzer::new(48_000).analyze(&[], 0), None);
    }

    #[test]
    fn window_shorter_than_half_chunk_has_no_stats() {
        let analyzer = LevelAnalyzer::new(48_000);
        assert_eq!(analyzer.analyze(&square(0.5, 1_000), 0), None);
    }

    #[test]
    fn min_max_come_from_chunks_and_avg_from_whole_window() {
        let analyzer = LevelAnalyzer::new(100);
        let mut window = square(0.1, 100); // ten chunks at -20 dB
        window.extend(square(1.0, 100)); // ten chunks at 0 dB

        let stats = analyzer.analyze(&window, 3).expect("stats");
        assert!((stats.min_db - (-20.0)).abs() < 1e-4);
        assert!(stats.max_db.abs() < 1e-4);

        // RMS of the full window is sqrt((0.01 + 1.0) / 2), not the mean of
        // the chunk levels (-10 dB).
        let expected_avg = 10.0 * 0.505_f64.log10();
        assert!((stats.avg_db - expected_avg).abs() < 1e-3, "{}", stats.avg_db);

        assert_eq!(stats.chunk_count, 20);
        assert_eq!(stats.overflow_count, 3);
        assert!((stats.duration_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn silent_window_reports_floor_everywhere() {
        let stats = LevelAnalyzer::new(100)
            .analyze(&[0.0; 300], 0)
            .expect("stats");
        assert_eq!(stats.min_db, SILENCE_FLOOR_DB);
        assert_eq!(stats.max_db, SILENCE_FLOOR_DB);
        assert_eq!(stats.avg_db, SILENCE_FLOOR_DB);
    }

    #[test]
    fn stats_serialize_with_field_names() {
        let stats = LevelAnalyzer::new(100)
            .analyze(&square(0.5, 100), 0)
            .expect("stats");
        let json = serde_json::to_value(stats).expect("serialize");
        assert!(json.get("min_db").is_some());
        assert!(json.get("overflow_count").is_some());
    }
}
