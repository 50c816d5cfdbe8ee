//! Configuration module for the noise meter.
//!
//! Provides `MeterConfig` (top-level settings), the `audio`, `publish` and
//! `mqtt` sub-configs, `AppPaths` for locating `settings.toml`, TOML
//! persistence via `MeterConfig::load_from` / `MeterConfig::save_to`, and
//! environment overrides.

pub mod paths;
pub mod settings;

pub use paths::{AppPaths, CONFIG_PATH_ENV};
pub use settings::{AudioConfig, ConfigError, MeterConfig, MqttConfig, PublishConfig, SinkKind};
