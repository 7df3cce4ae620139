//! Home Assistant MQTT discovery
//! Each tag is announced as four sensors whose state topics are the bridge's
//! own topics.

use serde::Serialize;

use crate::core::bluetooth::DeviceId;
use crate::mqtt::topics::{self, Topics};

/// Sensors announced per tag, in announcement order
pub const ENTITIES: [(&str, &str); 4] = [
    ("click", topics::BUTTON),
    ("rssi", topics::RSSI),
    ("battery", topics::BATTERY),
    ("presence", topics::PRESENCE),
];

#[derive(Debug, Serialize)]
pub struct SensorConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
}

/// `{prefix}/sensor/{id}_{entity}/config`, with `:` removed from the object id
pub fn config_topic(prefix: &str, id: &DeviceId, entity: &str) -> String {
    format!(
        "{}/sensor/{}_{}/config",
        prefix,
        id.as_str().replace(':', ""),
        entity
    )
}

pub fn sensor_config(topics: &Topics, id: &DeviceId, entity: &str, leaf: &str) -> SensorConfig {
    let (unit_of_measurement, device_class) = match entity {
        "rssi" => (Some("dBm"), Some("signal_strength")),
        "battery" => (Some("%"), Some("battery")),
        _ => (None, None),
    };
    SensorConfig {
        name: format!("{}_{}", id, entity),
        unique_id: format!("itag_{}_{}", id.as_str().replace(':', ""), entity),
        state_topic: topics.state(id, leaf),
        unit_of_measurement,
        device_class,
    }
}
