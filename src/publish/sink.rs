//! Concrete [`Publisher`] sinks.
//!
//! [`LogPublisher`] only logs a summary line per cycle.  [`JsonLinesPublisher`]
//! writes every rendered [`Message`] as one JSON object per line, so an
//! external bridge (e.g. `mosquitto_pub -l`) can forward them to a broker.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::audio::LevelStats;

use super::messages::{summary, Message, SensorMessages};
use super::{PublishError, Publisher};

// ---------------------------------------------------------------------------
// LogPublisher
// ---------------------------------------------------------------------------

/// Logs each cycle at `info` and the rendered state messages at `debug`.
pub struct LogPublisher {
    messages: SensorMessages,
}

impl LogPublisher {
    pub fn new(messages: SensorMessages) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, stats: &LevelStats) -> Result<(), PublishError> {
        for message in self.messages.state_messages(stats) {
            log::debug!("{} = {}", message.topic, message.payload);
        }
        log::info!("{}", summary(stats));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonLinesPublisher
// ---------------------------------------------------------------------------

/// Writes `{"topic":…,"payload":…,"retain":…}` lines to `W`.
///
/// Writes happen on tokio's blocking pool; `W` may be a slow pipe.
pub struct JsonLinesPublisher<W: Write + Send + 'static> {
    messages: SensorMessages,
    writer: Arc<Mutex<W>>,
}

impl JsonLinesPublisher<std::io::Stdout> {
    /// Publisher writing to the process's standard output.
    pub fn stdout(messages: SensorMessages) -> Self {
        Self::new(messages, std::io::stdout())
    }
}

impl<W: Write + Send + 'static> JsonLinesPublisher<W> {
    pub fn new(messages: SensorMessages, writer: W) -> Self {
        Self {
            messages,
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Emit the retained discovery configs.  Call once at startup, before
    /// the scheduler runs.
    pub fn announce(&self) -> Result<(), PublishError> {
        write_lines(&self.writer, &self.messages.discovery_messages())?;
        log::info!("published discovery configuration");
        Ok(())
    }
}

fn write_lines<W: Write>(writer: &Mutex<W>, messages: &[Message]) -> Result<(), PublishError> {
    let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
    for message in messages {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        writer.write_all(&line)?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl<W: Write + Send + 'static> Publisher for JsonLinesPublisher<W> {
    async fn publish(&self, stats: &LevelStats) -> Result<(), PublishError> {
        let messages = self.messages.state_messages(stats);
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || write_lines(&writer, &messages)).await??;
        log::info!("{}", summary(stats));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublishConfig;

    fn stats() -> LevelStats {
        LevelStats {
            min_db: -50.0,
            max_db: -20.0,
            avg_db: -31.2,
            duration_secs: 10.0,
            overflow_count: 0,
            chunk_count: 100,
        }
    }

    fn lines(bytes: Vec<u8>) -> Vec<serde_json::Value> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Cloneable in-memory writer, so output can be read after publishing.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// A writer that always fails.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_publisher_never_fails() {
        let publisher = LogPublisher::new(SensorMessages::new(&PublishConfig::default()));
        assert!(publisher.publish(&stats()).await.is_ok());
    }

    #[tokio::test]
    async fn json_lines_publisher_writes_one_line_per_sensor() {
        let out = SharedBuf::default();
        let publisher =
            JsonLinesPublisher::new(SensorMessages::new(&PublishConfig::default()), out.clone());
        publisher.publish(&stats()).await.unwrap();

        let written = lines(out.bytes());
        assert_eq!(written.len(), 3);
        assert_eq!(written[0]["topic"], "noisemeter/noisemeter_001/min_db");
        assert_eq!(written[0]["payload"], "-50.0");
        assert_eq!(written[2]["payload"], "-31.2");
        assert_eq!(written[2]["retain"], false);
    }

    #[test]
    fn announce_writes_retained_discovery() {
        let out = SharedBuf::default();
        let publisher =
            JsonLinesPublisher::new(SensorMessages::new(&PublishConfig::default()), out.clone());
        publisher.announce().unwrap();

        let written = lines(out.bytes());
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|m| m["retain"] == true));
        assert!(written[0]["topic"]
            .as_str()
            .unwrap()
            .starts_with("homeassistant/sensor/"));
    }

    #[tokio::test]
    async fn writer_failure_surfaces_as_io_error() {
        let publisher =
            JsonLinesPublisher::new(SensorMessages::new(&PublishConfig::default()), BrokenPipe);
        let err = publisher.publish(&stats()).await.unwrap_err();
        assert!(matches!(err, PublishError::Io(_)), "got {err:?}");
    }

    /// Publishing from a current-thread runtime must not stall it while the
    /// writer blocks.
    #[tokio::test]
    async fn slow_writer_does_not_block_the_runtime() {
        struct SlowWriter;

        impl Write for SlowWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                std::thread::sleep(std::time::Duration::from_millis(40));
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let publisher =
            JsonLinesPublisher::new(SensorMessages::new(&PublishConfig::default()), SlowWriter);
        let ticker = tokio::spawn(async {
            let mut ticks = 0u32;
            for _ in 0..5 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                ticks += 1;
            }
            ticks
        });

        publisher.publish(&stats()).await.unwrap();
        // Three lines at 40 ms each leave ample time for five 5 ms ticks.
        assert!(ticker.is_finished());
        assert_eq!(ticker.await.unwrap(), 5);
    }

    #[test]
    fn publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogPublisher>();
        assert_send_sync::<JsonLinesPublisher<SharedBuf>>();
    }
}
