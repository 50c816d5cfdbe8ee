//! Audio input via `cpal`.
//!
//! [`CaptureSource`] is the seam between the device layer and the core: a
//! source reports its native format and, once started, drives a
//! [`CaptureHandler`] from its own real-time thread.  [`CpalCapture`] is the
//! production source.  The [`StreamHandle`] it returns is a RAII guard:
//! dropping it stops the underlying cpal stream and releases the device.
//!
//! cpal does not report input overruns directly, so [`BlockClock`] watches
//! the capture timestamps: a block that arrives more than one block
//! duration late means the driver dropped input in between.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use thiserror::Error;

use super::device::select_input_device;
use super::handler::{CaptureHandler, CaptureStats};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("audio device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Enumerate(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// CaptureSource
// ---------------------------------------------------------------------------

/// Native stream format of a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Frames per second per channel.
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channels: u16,
}

/// A device that pushes interleaved blocks into a [`CaptureHandler`].
///
/// # Contract
///
/// - blocks arrive at [`format`](Self::format)`.sample_rate`, interleaved
///   with `format().channels` channels;
/// - the handler is invoked on a dedicated thread, never on the caller's;
/// - capture continues until the returned `Stream` is dropped.
pub trait CaptureSource {
    /// Guard that keeps the stream running.
    type Stream;

    fn format(&self) -> CaptureFormat;

    fn start(&self, handler: CaptureHandler) -> Result<Self::Stream, CaptureError>;
}

// ---------------------------------------------------------------------------
// Overrun detection
// ---------------------------------------------------------------------------

/// `true` when `elapsed` between two block timestamps is more than twice
/// the duration of the earlier block, i.e. at least one block went missing.
pub fn is_discontinuous(elapsed: Duration, previous_frames: usize, sample_rate: u32) -> bool {
    if sample_rate == 0 || previous_frames == 0 {
        return false;
    }
    let expected = Duration::from_secs_f64(previous_frames as f64 / sample_rate as f64);
    elapsed > expected * 2
}

/// Tracks capture timestamps across callbacks.
#[derive(Debug)]
pub struct BlockClock {
    sample_rate: u32,
    last: Option<(cpal::StreamInstant, usize)>,
}

impl BlockClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            last: None,
        }
    }

    /// Record a block of `frames` captured at `capture` and report whether
    /// input was dropped since the previous block.
    pub fn observe(&mut self, capture: cpal::StreamInstant, frames: usize) -> bool {
        let overflow = match self.last {
            Some((previous, previous_frames)) => capture
                .duration_since(&previous)
                .map(|elapsed| is_discontinuous(elapsed, previous_frames, self.sample_rate))
                .unwrap_or(false),
            None => false,
        };
        self.last = Some((capture, frames));
        overflow
    }
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Not `Send` on every platform; keep it on the thread that started it.
pub struct StreamHandle {
    stream: cpal::Stream,
}

impl StreamHandle {
    /// Pause the stream and release the device.
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            log::warn!("failed to pause audio stream: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// Interleaved samples buffered per callback before conversion to `f32`.
const SCRATCH_SAMPLES: usize = 16_384;

/// Capture source built on top of `cpal`.
pub struct CpalCapture {
    device: cpal::Device,
    device_name: String,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
}

impl CpalCapture {
    /// Open the input device matching `selector` (default input when `None`)
    /// at its native sample rate.
    ///
    /// `channels` overrides the device's default channel count.
    ///
    /// # Errors
    ///
    /// See [`select_input_device`]; [`CaptureError::DefaultConfig`] when the
    /// device cannot report a default stream configuration.
    pub fn open(selector: Option<&str>, channels: Option<u16>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = select_input_device(&host, selector)?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".into());

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let mut config: cpal::StreamConfig = supported.into();
        if let Some(channels) = channels {
            config.channels = channels;
        }

        Ok(Self {
            device,
            device_name,
            config,
            sample_format,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn build_stream<T>(
        &self,
        mut handler: CaptureHandler,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.config.channels.max(1) as usize;
        let mut clock = BlockClock::new(self.config.sample_rate.0);
        let mut scratch: Vec<f32> = Vec::with_capacity(SCRATCH_SAMPLES);
        let stats: Arc<CaptureStats> = Arc::clone(handler.stats());

        self.device.build_input_stream(
            &self.config,
            move |data: &[T], info: &cpal::InputCallbackInfo| {
                let frames = data.len() / channels;
                let overflow = clock.observe(info.timestamp().capture, frames);
                scratch.clear();
                scratch.extend(data.iter().map(|&s| <f32 as Sample>::from_sample(s)));
                handler.on_block(&scratch, frames, overflow);
            },
            move |err: cpal::StreamError| match err {
                cpal::StreamError::DeviceNotAvailable => {
                    log::error!("audio device disconnected");
                    stats.mark_failed();
                }
                other => {
                    // Backends surface xruns here; count them like dropped blocks.
                    log::warn!("cpal stream error: {other}");
                    stats.record_overflow();
                }
            },
            None,
        )
    }
}

impl CaptureSource for CpalCapture {
    type Stream = StreamHandle;

    fn format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    /// Start streaming into `handler`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::UnsupportedFormat`] for sample formats other than
    /// `f32`, `i16` and `u16`; [`CaptureError::BuildStream`] or
    /// [`CaptureError::PlayStream`] if the platform rejects the stream.
    fn start(&self, handler: CaptureHandler) -> Result<StreamHandle, CaptureError> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(handler)?,
            SampleFormat::I16 => self.build_stream::<i16>(handler)?,
            SampleFormat::U16 => self.build_stream::<u16>(handler)?,
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };

        stream.play()?;
        Ok(StreamHandle { stream })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_time_block_is_continuous() {
        // 480 frames at 48 kHz = 10 ms
        assert!(!is_discontinuous(Duration::from_millis(10), 480, 48_000));
        assert!(!is_discontinuous(Duration::from_millis(19), 480, 48_000));
    }

    #[test]
    fn late_block_is_discontinuous() {
        assert!(is_discontinuous(Duration::from_millis(25), 480, 48_000));
    }

    #[test]
    fn degenerate_inputs_never_flag() {
        assert!(!is_discontinuous(Duration::from_secs(5), 0, 48_000));
        assert!(!is_discontinuous(Duration::from_secs(5), 480, 0));
    }

    #[test]
    fn capture_error_display_is_informative() {
        let err = CaptureError::DeviceNotFound("usb mic".into());
        assert!(err.to_string().contains("usb mic"));
    }

    /// `CaptureHandler` crosses into the cpal callback thread.
    #[test]
    fn handler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureHandler>();
    }
}
