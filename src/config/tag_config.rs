use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-tag behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Period of the RSSI poll while a tag is connected.
    pub rssi_update_interval_ms: u64,
    /// Window in which a second press turns a click into a double click.
    pub double_click_interval_ms: u64,
    /// Sound a short continuous alert once a tag is set up.
    pub beep_on_connect: bool,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            rssi_update_interval_ms: 15_000,
            double_click_interval_ms: 800,
            beep_on_connect: true,
        }
    }
}

impl TagConfig {
    pub fn rssi_update_interval(&self) -> Duration {
        Duration::from_millis(self.rssi_update_interval_ms)
    }

    pub fn double_click_interval(&self) -> Duration {
        Duration::from_millis(self.double_click_interval_ms)
    }
}
