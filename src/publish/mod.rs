//! Publication of level statistics.
//!
//! This module provides:
//! * [`Publisher`]: async trait implemented by every output sink.
//! * [`SensorMessages`]: renders state and discovery messages (topic,
//!   payload, retain flag) for one device.
//! * [`LogPublisher`]: one summary log line per cycle.
//! * [`JsonLinesPublisher`]: one JSON object per message on any writer.
//! * [`MqttPublisher`]: publishes to an MQTT broker; [`mqtt::connect`]
//!   spawns the event loop that re-announces discovery on every connect.
//! * [`Sink`]: the configured publisher plus whatever must be closed at exit.
//! * [`PublishError`]: error variants for sink operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use noise_meter::config::PublishConfig;
//! use noise_meter::publish::{JsonLinesPublisher, Publisher, SensorMessages};
//!
//! #[tokio::main]
//! async fn main() {
//!     let messages = SensorMessages::new(&PublishConfig::default());
//!     let publisher = JsonLinesPublisher::stdout(messages);
//!     publisher.announce().unwrap();
//!     // publisher.publish(&stats).await? once per cycle
//! }
//! ```

pub mod messages;
pub mod mqtt;
pub mod sink;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::LevelStats;
use crate::config::{MeterConfig, SinkKind};

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use messages::{Message, Sensor, SensorMessages};
pub use mqtt::{MqttLink, MqttPublisher, MqttTransport};
pub use sink::{JsonLinesPublisher, LogPublisher};

// ---------------------------------------------------------------------------
// PublishError
// ---------------------------------------------------------------------------

/// Errors that can occur while emitting messages.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The underlying writer failed.
    #[error("failed to write message: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The MQTT client rejected the request (e.g. its queue is closed).
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The publishing task panicked or was cancelled.
    #[error("publish task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// Publisher trait
// ---------------------------------------------------------------------------

/// Async trait for statistics sinks.
///
/// Implementors must be `Send + Sync` so they can be shared with the
/// scheduler task as `Arc<dyn Publisher>`.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, stats: &LevelStats) -> Result<(), PublishError>;
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// The publisher selected by the configuration.
pub struct Sink {
    publisher: Arc<dyn Publisher>,
    link: Option<MqttLink>,
}

impl Sink {
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::clone(&self.publisher)
    }

    /// Disconnect from the broker, if there is one.
    pub async fn close(self) {
        if let Some(link) = self.link {
            link.close().await;
        }
    }
}

/// Build the sink selected by `config`, announcing discovery messages where
/// the sink carries them.  The MQTT sink announces from its event loop once
/// the broker accepts the connection.
///
/// Must be called from within a tokio runtime.
pub fn from_config(config: &MeterConfig) -> Result<Sink, PublishError> {
    let messages = SensorMessages::new(&config.publish);
    let (publisher, link): (Arc<dyn Publisher>, _) = match config.publish.sink {
        SinkKind::Mqtt => {
            let (publisher, link) =
                mqtt::connect(&config.mqtt, &config.publish.device_id, messages);
            (Arc::new(publisher), Some(link))
        }
        SinkKind::Log => (Arc::new(LogPublisher::new(messages)), None),
        SinkKind::JsonLines => {
            let publisher = JsonLinesPublisher::stdout(messages);
            publisher.announce()?;
            (Arc::new(publisher), None)
        }
    };
    Ok(Sink { publisher, link })
}
