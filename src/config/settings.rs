//! Meter settings structs, defaults, environment overrides and TOML
//! persistence.
//!
//! Settings are resolved in three layers:
//!
//! 1. built-in defaults,
//! 2. `settings.toml` (missing keys fall back to the defaults),
//! 3. environment variables (`AUDIO_DEVICE`, `CHANNELS`, `BUFFER_DURATION`,
//!    `ANALYSIS_WINDOW`, `PUBLISH_INTERVAL`, `MQTT_HOST`, `MQTT_PORT`,
//!    `MQTT_USER`, `MQTT_PASSWORD`, `MQTT_TOPIC_PREFIX`, `DEVICE_NAME`,
//!    `DEVICE_ID`, `PUBLISH_SINK`).
//!
//! The result is validated before use.  Invalid values are rejected rather
//! than clamped because they change what the statistics mean.

use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A setting that cannot be used as given.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a positive number of seconds (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error(
        "analysis window ({window_secs}s) is longer than the buffer ({buffer_secs}s)"
    )]
    WindowExceedsBuffer { window_secs: f64, buffer_secs: f64 },

    #[error("chunk length ({chunk_secs}s) is longer than the analysis window ({window_secs}s)")]
    ChunkExceedsWindow { chunk_secs: f64, window_secs: f64 },

    #[error("unsupported channel count {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),

    #[error("device_id must not be empty")]
    EmptyDeviceId,

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("unknown publish sink {0:?} (expected \"mqtt\", \"log\" or \"json_lines\")")]
    UnknownSink(String),

    #[error("MQTT broker host must not be empty")]
    EmptyBrokerHost,

    #[error("MQTT broker port must not be 0")]
    ZeroBrokerPort,
}

// ---------------------------------------------------------------------------
// SinkKind
// ---------------------------------------------------------------------------

/// Where rendered sensor messages go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Publish to an MQTT broker.
    #[default]
    Mqtt,
    /// One summary log line per cycle.
    Log,
    /// One JSON object per message on stdout, for an external bus bridge.
    JsonLines,
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "log" => Ok(Self::Log),
            "json_lines" | "json-lines" | "jsonl" => Ok(Self::JsonLines),
            other => Err(ConfigError::UnknownSink(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture and analysis timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device index or name fragment; `None` means the system default.
    pub device: Option<String>,
    /// Channels requested from the device (1 or 2).
    pub channels: u16,
    /// Seconds of audio held in the ring buffer.
    pub buffer_duration_secs: f64,
    /// Seconds of audio analysed per cycle.  Must not exceed the buffer.
    pub analysis_window_secs: f64,
    /// Seconds between published results.
    pub publish_interval_secs: f64,
    /// Chunk length used for min/max levels.  Must not exceed the window.
    pub chunk_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            channels: 1,
            buffer_duration_secs: 30.0,
            analysis_window_secs: 10.0,
            publish_interval_secs: 5.0,
            chunk_secs: 0.1,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("buffer_duration_secs", self.buffer_duration_secs)?;
        positive("analysis_window_secs", self.analysis_window_secs)?;
        positive("publish_interval_secs", self.publish_interval_secs)?;
        positive("chunk_secs", self.chunk_secs)?;

        if self.analysis_window_secs > self.buffer_duration_secs {
            return Err(ConfigError::WindowExceedsBuffer {
                window_secs: self.analysis_window_secs,
                buffer_secs: self.buffer_duration_secs,
            });
        }
        if self.chunk_secs > self.analysis_window_secs {
            return Err(ConfigError::ChunkExceedsWindow {
                chunk_secs: self.chunk_secs,
                window_secs: self.analysis_window_secs,
            });
        }
        if !(1..=2).contains(&self.channels) {
            return Err(ConfigError::UnsupportedChannels(self.channels));
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

// ---------------------------------------------------------------------------
// PublishConfig
// ---------------------------------------------------------------------------

/// Sensor identity and message routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub sink: SinkKind,
    /// First segment of every state topic.
    pub topic_prefix: String,
    /// Prefix under which discovery configs are announced.
    pub discovery_prefix: String,
    /// Human-readable device name shown by the hub.
    pub device_name: String,
    /// Stable identifier used in topics and unique ids.
    pub device_id: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            topic_prefix: "noisemeter".into(),
            discovery_prefix: "homeassistant".into(),
            device_name: "Noise Meter".into(),
            device_id: "noisemeter_001".into(),
        }
    }
}

impl PublishConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MqttConfig
// ---------------------------------------------------------------------------

/// Broker connection, used when `publish.sink` is `mqtt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Credentials are only sent when a username is set.
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }
}

impl MqttConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyBrokerHost);
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroBrokerPort);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MeterConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use noise_meter::config::MeterConfig;
///
/// // File (or defaults) + environment, validated.
/// let config = MeterConfig::resolve().unwrap();
/// println!("window: {}s", config.audio.analysis_window_secs);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub audio: AudioConfig,
    pub publish: PublishConfig,
    pub mqtt: MqttConfig,
}

impl MeterConfig {
    /// Load the settings file, apply the process environment and validate.
    pub fn resolve() -> Result<Self> {
        let path = AppPaths::settings_path();
        let mut config = Self::load_from(&path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        config.apply_process_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path.
    ///
    /// Returns `Ok(MeterConfig::default())` when the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// An empty `AUDIO_DEVICE` selects the default device; unparseable
    /// numbers are rejected.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup("AUDIO_DEVICE") {
            let device = device.trim();
            self.audio.device = (!device.is_empty()).then(|| device.to_string());
        }
        if let Some(raw) = lookup("CHANNELS") {
            self.audio.channels = parse_env("CHANNELS", raw)?;
        }
        if let Some(raw) = lookup("BUFFER_DURATION") {
            self.audio.buffer_duration_secs = parse_env("BUFFER_DURATION", raw)?;
        }
        if let Some(raw) = lookup("ANALYSIS_WINDOW") {
            self.audio.analysis_window_secs = parse_env("ANALYSIS_WINDOW", raw)?;
        }
        if let Some(raw) = lookup("PUBLISH_INTERVAL") {
            self.audio.publish_interval_secs = parse_env("PUBLISH_INTERVAL", raw)?;
        }
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host.trim().to_string();
        }
        if let Some(raw) = lookup("MQTT_PORT") {
            self.mqtt.port = parse_env("MQTT_PORT", raw)?;
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt.username = (!user.is_empty()).then_some(user);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = (!password.is_empty()).then_some(password);
        }
        if let Some(prefix) = lookup("MQTT_TOPIC_PREFIX") {
            self.publish.topic_prefix = prefix;
        }
        if let Some(name) = lookup("DEVICE_NAME") {
            self.publish.device_name = name;
        }
        if let Some(id) = lookup("DEVICE_ID") {
            self.publish.device_id = id;
        }
        if let Some(sink) = lookup("PUBLISH_SINK") {
            self.publish.sink = sink.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.publish.validate()?;
        if self.publish.sink == SinkKind::Mqtt {
            self.mqtt.validate()?;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value: raw })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
