//! Topic layout under the configured base path.

use crate::core::bluetooth::{AlertKind, DeviceId};

pub const PRESENCE: &str = "presence";
pub const RSSI: &str = "rssi";
pub const BATTERY: &str = "battery";
pub const BUTTON: &str = "button";
pub const ALERT: &str = "alert";

#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// `{base}/{id}/{leaf}`
    pub fn state(&self, id: &DeviceId, leaf: &str) -> String {
        format!("{}/{}/{}", self.base, id, leaf)
    }

    /// `{base}/{id}/alert/{kind}`
    pub fn alert(&self, id: &DeviceId, kind: AlertKind) -> String {
        format!("{}/{}/{}/{}", self.base, id, ALERT, kind.as_str())
    }

    /// Command topics a connected tag listens on
    pub fn alert_topics(&self, id: &DeviceId) -> Vec<String> {
        vec![
            self.alert(id, AlertKind::Continuous),
            self.alert(id, AlertKind::Beep),
        ]
    }
}
