use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// What happens to the Home Assistant entities of a tag when it disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectAction {
    /// Leave every entity in place.
    KeepAll,
    /// Remove every entity except presence.
    KeepPresence,
    /// Remove every entity, presence included.
    RemoveAll,
}

impl FromStr for DisconnectAction {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // numeric values are accepted for compatibility with older deployments
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "keep_all" => Ok(Self::KeepAll),
            "1" | "keep_presence" => Ok(Self::KeepPresence),
            "2" | "remove_all" => Ok(Self::RemoveAll),
            other => Err(BridgeError::Config(format!(
                "unknown disconnect action {other:?}"
            ))),
        }
    }
}

/// Home Assistant MQTT discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub enabled: bool,
    pub discovery_prefix: String,
    pub on_disconnect: DisconnectAction,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        HomeAssistantConfig {
            enabled: false,
            discovery_prefix: "homeassistant".to_string(),
            on_disconnect: DisconnectAction::KeepPresence,
        }
    }
}
