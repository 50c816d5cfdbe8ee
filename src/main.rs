//! Application entry point for the noise meter.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Resolve [`MeterConfig`] (settings file + environment) and validate it.
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Open the input device and start the cpal stream into the ring buffer.
//! 5. Build the publisher.  The MQTT sink connects in the background and
//!    announces discovery on every broker connect; the JSON-lines sink
//!    announces immediately.
//! 6. Spawn the analysis scheduler on the runtime.
//! 7. Block until SIGINT/SIGTERM or a stream failure, then shut down:
//!    stop the stream, join the scheduler, disconnect from the broker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;

use noise_meter::{
    audio::{
        CaptureHandler, CaptureSource, CaptureStats, CpalCapture, LevelAnalyzer,
        SharedRingBuffer,
    },
    config::MeterConfig,
    publish,
    scheduler::{AnalysisScheduler, SchedulerConfig},
};

/// Upper bound on waiting for the scheduler task after shutdown is signalled.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How often the main task checks the stream-failure flag.
const FAILURE_POLL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Shutdown signals
// ---------------------------------------------------------------------------

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            log::warn!("cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

async fn stream_failure(stats: &CaptureStats) {
    let mut poll = tokio::time::interval(FAILURE_POLL);
    loop {
        poll.tick().await;
        if stats.has_failed() {
            return;
        }
    }
}

/// Resolve once the process should stop; returns the reason.
async fn wait_for_shutdown(stats: &CaptureStats) -> &'static str {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::error!("cannot listen for Ctrl-C: {e}");
            }
            "interrupt"
        }
        _ = terminate() => "SIGTERM",
        _ = stream_failure(stats) => "audio stream failed",
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("noise meter starting up");

    // 2. Configuration
    let config = MeterConfig::resolve().context("invalid configuration")?;
    log::info!(
        "buffer {:.1}s, window {:.1}s, publish every {:.1}s",
        config.audio.buffer_duration_secs,
        config.audio.analysis_window_secs,
        config.audio.publish_interval_secs
    );

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Capture.  The stream handle is not `Send`; it stays on this thread.
    let capture = CpalCapture::open(config.audio.device.as_deref(), Some(config.audio.channels))
        .context("failed to open audio input")?;
    let format = capture.format();
    log::info!(
        "device: {} ({} Hz, {} ch)",
        capture.device_name(),
        format.sample_rate,
        format.channels
    );

    let buffer = SharedRingBuffer::with_duration(format.sample_rate, config.audio.buffer_duration_secs);
    let stats = Arc::new(CaptureStats::new());
    let handler = CaptureHandler::new(buffer.clone(), Arc::clone(&stats), format.channels);

    // 5. Publisher
    let sink = rt
        .block_on(async { publish::from_config(&config) })
        .context("failed to initialise publisher")?;

    let stream = capture.start(handler).context("failed to start audio stream")?;
    let stream_start = Instant::now();
    log::info!("audio capture started");

    // 6. Scheduler
    let scheduler = AnalysisScheduler::new(
        SchedulerConfig::from_audio(&config.audio),
        buffer.clone(),
        LevelAnalyzer::with_chunk_secs(format.sample_rate, config.audio.chunk_secs),
        Arc::clone(&stats),
        sink.publisher(),
        stream_start,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = rt.spawn(scheduler.run(shutdown_rx));

    // 7. Run until told to stop
    let reason = rt.block_on(wait_for_shutdown(&stats));
    log::info!("shutting down ({reason})");

    let _ = shutdown_tx.send(true);
    stream.stop();

    log::info!("total frames captured: {}", buffer.total_frames());
    let overflows = stats.overflow_count();
    if overflows > 0 {
        log::info!("total overflows: {overflows}");
    }

    rt.block_on(async {
        match tokio::time::timeout(JOIN_TIMEOUT, scheduler_task).await {
            Ok(Ok(published)) => log::debug!("scheduler joined after {published} publications"),
            Ok(Err(e)) => log::warn!("scheduler task failed: {e}"),
            Err(_) => log::warn!("scheduler did not stop within {JOIN_TIMEOUT:?}"),
        }
        sink.close().await;
    });

    log::info!("shutdown complete");

    if stats.has_failed() {
        anyhow::bail!("audio stream failed");
    }
    Ok(())
}
