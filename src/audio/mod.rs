//! Audio ingestion: device capture, mono reduction, ring buffer, levels.
//!
//! # Pipeline
//!
//! ```text
//! cpal callback ─▶ CaptureHandler::on_block ─▶ downmix ─▶ SharedRingBuffer::write
//!                                                              │
//! AnalysisScheduler ─▶ SharedRingBuffer::read_recent ◀─────────┘
//!                  └─▶ LevelAnalyzer::analyze ─▶ LevelStats
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use noise_meter::audio::{
//!     CaptureHandler, CaptureSource, CaptureStats, CpalCapture, LevelAnalyzer, SharedRingBuffer,
//! };
//!
//! let capture = CpalCapture::open(None, None).unwrap();
//! let format = capture.format();
//!
//! let buffer = SharedRingBuffer::with_duration(format.sample_rate, 30.0);
//! let stats = Arc::new(CaptureStats::new());
//! let handler = CaptureHandler::new(buffer.clone(), Arc::clone(&stats), format.channels);
//! let _stream = capture.start(handler).unwrap(); // drop to stop
//!
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! let window = buffer.read_recent(10.0);
//! if let Some(levels) = LevelAnalyzer::new(format.sample_rate).analyze(&window, stats.overflow_count()) {
//!     println!("avg {:.1} dB", levels.avg_db);
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod device;
pub mod downmix;
pub mod handler;
pub mod level;

pub use buffer::{AnalysisWindow, RingBuffer, SharedRingBuffer};
pub use capture::{CaptureError, CaptureFormat, CaptureSource, CpalCapture, StreamHandle};
pub use downmix::{downmix, downmix_into};
pub use handler::{CaptureHandler, CaptureStats};
pub use level::{decibels, LevelAnalyzer, LevelStats, DEFAULT_CHUNK_SECS, SILENCE_FLOOR_DB};
