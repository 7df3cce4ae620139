pub mod home_assistant_config;
pub mod mqtt_config;
pub mod tag_config;

use std::path::Path;

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::home_assistant_config::{DisconnectAction, HomeAssistantConfig};
use crate::config::mqtt_config::MqttConfig;
use crate::config::tag_config::TagConfig;
use crate::error::BridgeError;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "ITAG_BRIDGE_CONFIG";

const DEFAULT_LOG_LEVEL: &str = "debug";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub tag: TagConfig,
    pub home_assistant: HomeAssistantConfig,
    /// One of error, warn, info, debug, trace.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            mqtt: MqttConfig::default(),
            tag: TagConfig::default(),
            home_assistant: HomeAssistantConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Loads defaults, then the JSON file named by `ITAG_BRIDGE_CONFIG` if set,
    /// then overrides from the process environment.
    pub async fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_file(Path::new(&path)).await?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Loads the config from a JSON file. A missing file yields the defaults.
    pub async fn load_file(file_path: &Path) -> Result<Self> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!(
                "Config file not found at {:?}, using default.",
                file_path_str
            );
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path)
            .await
            .map_err(BridgeError::from)?;
        let config: Self = serde_json::from_str(&config_json).map_err(BridgeError::from)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Applies environment overrides through `lookup`, so tests can feed a map
    /// instead of the real process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MQTT_URL") {
            self.mqtt.url = url;
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(base_topic) = lookup("MQTT_BASE_TOPIC") {
            self.mqtt.base_topic = base_topic.trim_end_matches('/').to_string();
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(beep) = lookup("BEEP_ON_ITAG_CONNECT") {
            self.tag.beep_on_connect = parse_flag("BEEP_ON_ITAG_CONNECT", &beep)?;
        }
        if let Some(enabled) = lookup("HOME_ASSISTANT") {
            self.home_assistant.enabled = parse_flag("HOME_ASSISTANT", &enabled)?;
        }
        if let Some(prefix) = lookup("HOME_ASSISTANT_PREFIX") {
            self.home_assistant.discovery_prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(action) = lookup("ON_DISCONNECT_MQTT_ACTION") {
            self.home_assistant.on_disconnect = action.parse::<DisconnectAction>()?;
        }

        self.validate()
    }

    /// Rejects values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.mqtt.base_topic.is_empty() {
            return Err(BridgeError::Config("MQTT base topic must not be empty".into()));
        }
        if self.tag.rssi_update_interval_ms == 0 {
            return Err(BridgeError::Config(
                "tag.rssi_update_interval_ms must be greater than zero".into(),
            ));
        }
        if self.tag.double_click_interval_ms == 0 {
            return Err(BridgeError::Config(
                "tag.double_click_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, BridgeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BridgeError::Config(format!(
            "{key} expects a boolean, got {other:?}"
        ))),
    }
}
