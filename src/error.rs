//! Error types shared across the bridge.

use thiserror::Error;

use crate::core::bluetooth::DeviceId;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("alert duration {0} ms is outside the accepted range")]
    InvalidAlertDuration(i64),

    #[error("MQTT request queue is full, dropped request for {0}")]
    BusBackpressure(String),

    #[error("empty payload received from {0}")]
    EmptyPayload(DeviceId),

    #[error("notification stream closed before subscription was confirmed")]
    SubscriptionDropped,

    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),

    #[error("mqtt client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}
