//! MQTT output via `rumqttc`.
//!
//! [`connect`] creates the client and spawns the task that drives its event
//! loop.  Every successful `ConnAck` (the first connection and each
//! reconnect) re-sends the retained discovery configs, so a broker that lost
//! its retained store is repopulated.  State messages are queued without
//! waiting: a full queue while the broker is unreachable fails the tick
//! instead of stalling the scheduler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::task::JoinHandle;

use crate::audio::LevelStats;
use crate::config::MqttConfig;

use super::messages::{summary, Message, SensorMessages};
use super::{PublishError, Publisher};

/// Requests buffered between the publisher and the event loop.
const REQUEST_QUEUE: usize = 32;

/// Wait before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long [`MqttLink::close`] waits for the disconnect to go out.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Brokers reject keep-alives this short.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// MqttTransport
// ---------------------------------------------------------------------------

/// The part of an MQTT client the publisher needs.  Both calls only queue
/// the request and never wait on the network.
pub trait MqttTransport: Send + Sync + 'static {
    fn send(&self, message: Message) -> Result<(), PublishError>;

    fn disconnect(&self) -> Result<(), PublishError>;
}

impl MqttTransport for AsyncClient {
    fn send(&self, message: Message) -> Result<(), PublishError> {
        self.try_publish(
            message.topic,
            QoS::AtMostOnce,
            message.retain,
            message.payload.into_bytes(),
        )?;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), PublishError> {
        self.try_disconnect()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MqttPublisher
// ---------------------------------------------------------------------------

/// Publishes state messages through an [`MqttTransport`].
pub struct MqttPublisher<T: MqttTransport> {
    messages: SensorMessages,
    transport: Arc<T>,
}

impl<T: MqttTransport> Clone for MqttPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            messages: self.messages.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: MqttTransport> MqttPublisher<T> {
    pub fn new(messages: SensorMessages, transport: T) -> Self {
        Self {
            messages,
            transport: Arc::new(transport),
        }
    }

    /// Queue the retained discovery configs.
    pub fn announce(&self) -> Result<(), PublishError> {
        for message in self.messages.discovery_messages() {
            self.transport.send(message)?;
        }
        log::info!("published discovery configuration");
        Ok(())
    }

    /// Queue a clean disconnect.
    pub fn disconnect(&self) -> Result<(), PublishError> {
        self.transport.disconnect()
    }
}

#[async_trait]
impl<T: MqttTransport> Publisher for MqttPublisher<T> {
    async fn publish(&self, stats: &LevelStats) -> Result<(), PublishError> {
        for message in self.messages.state_messages(stats) {
            self.transport.send(message)?;
        }
        log::info!("{}", summary(stats));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// What an event-loop event means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The broker accepted the connection.
    Connected,
    /// The broker answered with an error code.
    Refused(ConnectReturnCode),
    /// Our disconnect request went out; the loop should end.
    Closing,
    Other,
}

pub fn classify(event: &Event) -> LinkEvent {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
            LinkEvent::Connected
        }
        Event::Incoming(Packet::ConnAck(ack)) => LinkEvent::Refused(ack.code),
        Event::Outgoing(Outgoing::Disconnect) => LinkEvent::Closing,
        _ => LinkEvent::Other,
    }
}

/// Broker options for `config`, using `client_id` as the MQTT client id.
pub fn options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(
        config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS),
    ));
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }
    options
}

/// Background event loop plus the handle used to shut it down.
pub struct MqttLink {
    publisher: MqttPublisher<AsyncClient>,
    task: JoinHandle<()>,
}

impl MqttLink {
    /// Send a disconnect and wait briefly for the event loop to flush it.
    pub async fn close(mut self) {
        if let Err(e) = self.publisher.disconnect() {
            log::warn!("failed to queue MQTT disconnect: {e}");
        }
        if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            log::warn!("MQTT event loop did not stop within {DISCONNECT_TIMEOUT:?}");
            self.task.abort();
        }
    }
}

/// Create the client and spawn its event loop.
///
/// Must be called from within a tokio runtime.
pub fn connect(
    config: &MqttConfig,
    client_id: &str,
    messages: SensorMessages,
) -> (MqttPublisher<AsyncClient>, MqttLink) {
    log::info!("connecting to MQTT broker at {}:{}", config.host, config.port);
    let (client, eventloop) = AsyncClient::new(options(config, client_id), REQUEST_QUEUE);
    let publisher = MqttPublisher::new(messages, client);
    let task = tokio::spawn(drive(eventloop, publisher.clone()));
    (
        publisher.clone(),
        MqttLink { publisher, task },
    )
}

async fn drive(mut eventloop: EventLoop, publisher: MqttPublisher<AsyncClient>) {
    loop {
        match eventloop.poll().await {
            Ok(event) => match classify(&event) {
                LinkEvent::Connected => {
                    log::info!("connected to MQTT broker");
                    if let Err(e) = publisher.announce() {
                        log::error!("failed to publish discovery configuration: {e}");
                    }
                }
                LinkEvent::Refused(code) => {
                    log::error!("failed to connect to MQTT broker: {code:?}");
                }
                LinkEvent::Closing => {
                    log::info!("disconnected from MQTT broker");
                    break;
                }
                LinkEvent::Other => {}
            },
            Err(e) => {
                log::warn!("MQTT connection error: {e}; retrying in {RECONNECT_DELAY:?}");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
