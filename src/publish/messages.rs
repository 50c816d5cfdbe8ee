//! Sensor message rendering.
//!
//! Each cycle produces one non-retained state message per sensor:
//!
//! ```text
//! {topic_prefix}/{device_id}/min_db   "-42.3"
//! {topic_prefix}/{device_id}/max_db   "-18.0"
//! {topic_prefix}/{device_id}/avg_db   "-30.7"
//! ```
//!
//! At startup a retained discovery config per sensor lets a home automation
//! hub create the entities on its own.

use serde::Serialize;
use serde_json::json;

use crate::audio::LevelStats;
use crate::config::PublishConfig;

/// Model string advertised in discovery configs.
const DEVICE_MODEL: &str = "MQTT Noise Meter";
const DEVICE_MANUFACTURER: &str = "Custom";

/// A rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// The three level sensors a meter exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Min,
    Max,
    Avg,
}

impl Sensor {
    pub const ALL: [Sensor; 3] = [Sensor::Min, Sensor::Max, Sensor::Avg];

    /// Topic segment and unique-id suffix.
    pub fn key(self) -> &'static str {
        match self {
            Sensor::Min => "min_db",
            Sensor::Max => "max_db",
            Sensor::Avg => "avg_db",
        }
    }

    pub fn friendly_name(self) -> &'static str {
        match self {
            Sensor::Min => "Minimum dB",
            Sensor::Max => "Maximum dB",
            Sensor::Avg => "Average dB",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Sensor::Min => "mdi:volume-low",
            Sensor::Max => "mdi:volume-high",
            Sensor::Avg => "mdi:volume-medium",
        }
    }

    fn value(self, stats: &LevelStats) -> f64 {
        match self {
            Sensor::Min => stats.min_db,
            Sensor::Max => stats.max_db,
            Sensor::Avg => stats.avg_db,
        }
    }
}

/// Renders messages for one configured device.
#[derive(Debug, Clone)]
pub struct SensorMessages {
    topic_prefix: String,
    discovery_prefix: String,
    device_name: String,
    device_id: String,
}

impl SensorMessages {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            topic_prefix: config.topic_prefix.clone(),
            discovery_prefix: config.discovery_prefix.clone(),
            device_name: config.device_name.clone(),
            device_id: config.device_id.clone(),
        }
    }

    pub fn state_topic(&self, sensor: Sensor) -> String {
        format!("{}/{}/{}", self.topic_prefix, self.device_id, sensor.key())
    }

    pub fn discovery_topic(&self, sensor: Sensor) -> String {
        format!(
            "{}/sensor/{}_{}/config",
            self.discovery_prefix,
            self.device_id,
            sensor.key()
        )
    }

    /// One state message per sensor, values to one decimal place.
    pub fn state_messages(&self, stats: &LevelStats) -> Vec<Message> {
        Sensor::ALL
            .iter()
            .map(|&sensor| Message {
                topic: self.state_topic(sensor),
                payload: format!("{:.1}", sensor.value(stats)),
                retain: false,
            })
            .collect()
    }

    /// Retained discovery configs, one per sensor.
    pub fn discovery_messages(&self) -> Vec<Message> {
        Sensor::ALL
            .iter()
            .map(|&sensor| {
                let config = json!({
                    "name": format!("{} {}", self.device_name, sensor.friendly_name()),
                    "unique_id": format!("{}_{}", self.device_id, sensor.key()),
                    "state_topic": self.state_topic(sensor),
                    "unit_of_measurement": "dB",
                    "device_class": "sound_pressure",
                    "icon": sensor.icon(),
                    "device": {
                        "identifiers": [self.device_id.as_str()],
                        "name": self.device_name.as_str(),
                        "model": DEVICE_MODEL,
                        "manufacturer": DEVICE_MANUFACTURER,
                    },
                });
                Message {
                    topic: self.discovery_topic(sensor),
                    payload: config.to_string(),
                    retain: true,
                }
            })
            .collect()
    }
}

/// Human-readable cycle summary, e.g.
/// `Published: min=-42.3dB, max=-18.0dB, avg=-30.7dB (overflows: 2)`.
pub fn summary(stats: &LevelStats) -> String {
    let overflows = if stats.overflow_count > 0 {
        format!(" (overflows: {})", stats.overflow_count)
    } else {
        String::new()
    };
    format!(
        "Published: min={:.1}dB, max={:.1}dB, avg={:.1}dB{overflows}",
        stats.min_db, stats.max_db, stats.avg_db
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(overflow_count: u64) -> LevelStats {
        LevelStats {
            min_db: -42.34,
            max_db: -17.96,
            avg_db: -30.74,
            duration_secs: 10.0,
            overflow_count,
            chunk_count: 100,
        }
    }

    fn messages() -> SensorMessages {
        SensorMessages::new(&PublishConfig::default())
    }

    #[test]
    fn state_messages_use_prefix_and_one_decimal() {
        let msgs = messages().state_messages(&stats(0));
        let rendered: Vec<(&str, &str)> = msgs
            .iter()
            .map(|m| (m.topic.as_str(), m.payload.as_str()))
            .collect();

        assert_eq!(
            rendered,
            vec![
                ("noisemeter/noisemeter_001/min_db", "-42.3"),
                ("noisemeter/noisemeter_001/max_db", "-18.0"),
                ("noisemeter/noisemeter_001/avg_db", "-30.7"),
            ]
        );
        assert!(msgs.iter().all(|m| !m.retain));
    }

    #[test]
    fn discovery_messages_are_retained_and_complete() {
        let msgs = messages().discovery_messages();
        assert_eq!(msgs.len(), 3);
        assert!(msgs.iter().all(|m| m.retain));

        let avg = &msgs[2];
        assert_eq!(
            avg.topic,
            "homeassistant/sensor/noisemeter_001_avg_db/config"
        );

        let payload: serde_json::Value = serde_json::from_str(&avg.payload).unwrap();
        assert_eq!(payload["name"], "Noise Meter Average dB");
        assert_eq!(payload["unique_id"], "noisemeter_001_avg_db");
        assert_eq!(payload["state_topic"], "noisemeter/noisemeter_001/avg_db");
        assert_eq!(payload["unit_of_measurement"], "dB");
        assert_eq!(payload["device_class"], "sound_pressure");
        assert_eq!(payload["icon"], "mdi:volume-medium");
        assert_eq!(payload["device"]["identifiers"][0], "noisemeter_001");
        assert_eq!(payload["device"]["model"], "MQTT Noise Meter");
        assert_eq!(payload["device"]["manufacturer"], "Custom");
    }

    #[test]
    fn custom_identity_flows_into_topics() {
        let config = PublishConfig {
            topic_prefix: "home/noise".into(),
            discovery_prefix: "ha".into(),
            device_id: "office".into(),
            ..PublishConfig::default()
        };
        let msgs = SensorMessages::new(&config);
        assert_eq!(msgs.state_topic(Sensor::Min), "home/noise/office/min_db");
        assert_eq!(msgs.discovery_topic(Sensor::Max), "ha/sensor/office_max_db/config");
    }

    #[test]
    fn summary_mentions_overflows_only_when_present() {
        assert_eq!(
            summary(&stats(0)),
            "Published: min=-42.3dB, max=-18.0dB, avg=-30.7dB"
        );
        assert!(summary(&stats(3)).ends_with(" (overflows: 3)"));
    }
}
