//! Noise meter: continuous sound-level monitoring from an audio input.
//!
//! Audio is captured on the device's real-time thread, reduced to mono and
//! written into a fixed-size ring buffer.  A scheduler task periodically
//! analyses the most recent window and publishes min/max/avg levels in dB.
//!
//! * [`audio`]: capture, mono reduction, ring buffer, level analysis.
//! * [`config`]: settings file, environment overrides, validation.
//! * [`publish`]: sensor messages and output sinks.
//! * [`scheduler`]: warm-up and the periodic analysis loop.

pub mod audio;
pub mod config;
pub mod publish;
pub mod scheduler;
