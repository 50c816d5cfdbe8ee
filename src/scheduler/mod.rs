//! Periodic analysis scheduler.
//!
//! # Architecture
//!
//! ```text
//!                   ┌── WarmingUp ── poll every warmup_poll ──┐
//! AnalysisScheduler │                                        ▼
//!   ::run()         └── Active ── read_recent(window) ─▶ LevelAnalyzer::analyze
//!                                                           │
//!                                                           ▼
//!                                                   Publisher::publish
//!                                                           │
//!                              sleep publish_interval ◀─────┘
//!
//! watch::Receiver<bool>   (shutdown)  ─── interrupts any sleep
//! watch::Sender<SchedulerState>       ─── observed by the binary
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use tokio::sync::watch;
//! use noise_meter::audio::{CaptureStats, LevelAnalyzer, SharedRingBuffer};
//! use noise_meter::config::{AudioConfig, PublishConfig};
//! use noise_meter::publish::{LogPublisher, SensorMessages};
//! use noise_meter::scheduler::{AnalysisScheduler, SchedulerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let buffer = SharedRingBuffer::with_duration(48_000, 30.0);
//!     let stats = Arc::new(CaptureStats::new());
//!     let publisher = Arc::new(LogPublisher::new(SensorMessages::new(&PublishConfig::default())));
//!
//!     let scheduler = AnalysisScheduler::new(
//!         SchedulerConfig::from_audio(&AudioConfig::default()),
//!         buffer,
//!         LevelAnalyzer::new(48_000),
//!         stats,
//!         publisher,
//!         Instant::now(),
//!     );
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let task = tokio::spawn(scheduler.run(shutdown_rx));
//!     // ... later
//!     shutdown_tx.send(true).unwrap();
//!     task.await.unwrap();
//! }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{AnalysisScheduler, SchedulerConfig, TickOutcome};
pub use state::{SchedulerState, Warmup};
