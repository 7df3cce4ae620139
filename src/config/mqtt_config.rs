use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

const DEFAULT_PORT: u16 = 1883;

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL, `mqtt://host[:port]` or `tcp://host[:port]`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Prefix of every state and command topic
    pub base_topic: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            url: "mqtt://localhost:1883".to_string(),
            username: None,
            password: None,
            client_id: "itag-mqtt-bridge".to_string(),
            base_topic: "itag".to_string(),
            keep_alive_secs: 30,
        }
    }
}

impl MqttConfig {
    /// Splits the broker URL into host and port.
    pub fn endpoint(&self) -> Result<(String, u16), BridgeError> {
        let rest = ["mqtt://", "tcp://"]
            .iter()
            .find_map(|scheme| self.url.strip_prefix(scheme))
            .ok_or_else(|| {
                BridgeError::Config(format!("unsupported MQTT url scheme: {}", self.url))
            })?;
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    BridgeError::Config(format!("invalid MQTT port in {}", self.url))
                })?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(BridgeError::Config(format!("missing MQTT host in {}", self.url)));
        }
        Ok((host.to_string(), port))
    }
}
