//! Buzzer commands of the tag
//! Alerts are driven through the Alert Level characteristic (0x2A06): a level
//! is written, held for the requested time and then reset to "no alert".

use std::time::Duration;

use anyhow::Result;
use log::{debug, info};
use tokio::time::sleep;

use crate::core::bluetooth::constants::{MAX_ALERT_MS, MIN_ALERT_MS};
use crate::core::bluetooth::device::TagCharacteristic;
use crate::error::BridgeError;

/// Values of the Alert Level characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Silence (0x00)
    NoAlert,
    /// Continuous tone on an iTAG (0x01)
    Mild,
    /// Beeping on an iTAG (0x02)
    High,
}

impl AlertLevel {
    pub fn to_bytes(self) -> [u8; 1] {
        match self {
            Self::NoAlert => [0x00],
            Self::Mild => [0x01],
            Self::High => [0x02],
        }
    }
}

/// Alert requested over the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Beep,
    Continuous,
}

impl AlertKind {
    pub fn level(self) -> AlertLevel {
        match self {
            Self::Beep => AlertLevel::High,
            Self::Continuous => AlertLevel::Mild,
        }
    }

    /// Name of the kind as used in command topics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beep => "beep",
            Self::Continuous => "continuous",
        }
    }

    pub fn from_topic(segment: &str) -> Option<Self> {
        match segment {
            "beep" => Some(Self::Beep),
            "continuous" => Some(Self::Continuous),
            _ => None,
        }
    }
}

/// Checks an alert duration against the accepted range.
pub fn alert_duration(ms: i64) -> Result<Duration, BridgeError> {
    if !(MIN_ALERT_MS..=MAX_ALERT_MS).contains(&ms) {
        return Err(BridgeError::InvalidAlertDuration(ms));
    }
    Ok(Duration::from_millis(ms as u64))
}

/// Drives one alert on one characteristic
pub struct AlertController<C: TagCharacteristic> {
    alert_level: C,
}

impl<C: TagCharacteristic> AlertController<C> {
    pub fn new(alert_level: C) -> Self {
        Self { alert_level }
    }

    /// Sets the alert level
    pub async fn set_level(&self, level: AlertLevel) -> Result<()> {
        debug!("Writing alert level {:?}", level);
        self.alert_level
            .write_without_response(&level.to_bytes())
            .await
    }

    /// Sounds `kind` for `duration`, then silences the tag. The silencing write
    /// is only scheduled once the first write was accepted.
    pub async fn sound(&self, kind: AlertKind, duration: Duration) -> Result<()> {
        self.set_level(kind.level()).await?;
        info!("Alert {} started for {:?}", kind.as_str(), duration);
        sleep(duration).await;
        self.set_level(AlertLevel::NoAlert).await?;
        debug!("Alert {} finished", kind.as_str());
        Ok(())
    }
}
