//! Channel reduction for interleaved capture blocks.
//!
//! Only mono audio is stored, so every block is collapsed before it reaches
//! the ring buffer:
//!
//! | Channels | Result |
//! |----------|--------|
//! | 1        | passed through |
//! | 2        | `(left + right) / 2` |
//! | n > 2    | mean of all `n` channels |
//!
//! [`downmix_into`] writes into a caller-owned vector so the capture
//! callback can reuse one allocation for the lifetime of the stream.

// ---------------------------------------------------------------------------
// downmix_into
// ---------------------------------------------------------------------------

/// Collapse interleaved `samples` with `channels` channels into `out`.
///
/// `out` is cleared first.  A trailing partial frame is ignored.  With
/// `channels == 0` the output stays empty.
pub fn downmix_into(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        0 => {}
        1 => out.extend_from_slice(samples),
        2 => out.extend(
            samples
                .chunks_exact(2)
                .map(|frame| (frame[0] + frame[1]) * 0.5),
        ),
        n => {
            let scale = 1.0 / n as f32;
            out.extend(
                samples
                    .chunks_exact(n)
                    .map(|frame| frame.iter().sum::<f32>() * scale),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// downmix
// ---------------------------------------------------------------------------

/// Allocating variant of [`downmix_into`].
///
/// ```rust
/// use noise_meter::audio::downmix;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len() / channels.max(1));
    downmix_into(samples, channels, &mut out);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
