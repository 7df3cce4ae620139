//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::core::bluetooth::device::TagPeripheral;

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}[0-9A-Fa-f]{2}").expect("valid MAC address pattern")
});

/// Identifier of a tag, safe to embed in an MQTT topic level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds an id from the platform's device identifier.
    ///
    /// Identifiers carrying a MAC address (BlueZ object paths, `hci0/AA:BB:..`)
    /// collapse to the upper-case colon-separated address. Anything else keeps
    /// its text with topic separators and wildcards replaced by `_`.
    pub fn from_platform(raw: &str) -> Self {
        if let Some(mac) = MAC_ADDRESS.find_iter(raw).last() {
            return Self(mac.as_str().replace(['_', '-'], ":").to_uppercase());
        }
        let sanitized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '+' | '#' => '_',
                c if c.is_whitespace() => '_',
                c => c,
            })
            .collect();
        Self(sanitized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discovered GATT service with the characteristics it carries.
#[derive(Debug, Clone)]
pub struct GattService<C> {
    pub uuid: Uuid,
    pub characteristics: Vec<C>,
}

impl<C> GattService<C> {
    pub fn new(uuid: Uuid, characteristics: Vec<C>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }
}

/// One advertisement seen while scanning
#[derive(Clone)]
pub struct Advertisement<P> {
    pub peripheral: P,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
}

/// Notifying characteristics the bridge listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Button,
    Battery,
}

/// Everything the lifecycle manager reacts to. Produced by the scanner, the
/// per-device tasks and the MQTT event pump; consumed in order by one task.
pub enum BridgeEvent<P: TagPeripheral> {
    Discovered(Advertisement<P>),
    Connected {
        id: DeviceId,
    },
    ConnectFailed {
        id: DeviceId,
        reason: String,
    },
    ServicesDiscovered {
        id: DeviceId,
        services: Vec<GattService<P::Characteristic>>,
    },
    SetupFailed {
        id: DeviceId,
        reason: String,
    },
    Disconnected {
        id: DeviceId,
    },
    ButtonPressed {
        id: DeviceId,
    },
    ClickWindowElapsed {
        id: DeviceId,
        epoch: u64,
    },
    BatteryLevel {
        id: DeviceId,
        level: u8,
    },
    Rssi {
        id: DeviceId,
        rssi: i16,
    },
    LinkLossReset {
        id: DeviceId,
    },
    BusConnected,
    BusMessage {
        topic: String,
        payload: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mac_from_bluez_path() {
        let id = DeviceId::from_platform("/org/bluez/hci0/dev_ff_ff_c2_0b_7d_1a");
        assert_eq!(id.as_str(), "FF:FF:C2:0B:7D:1A");
    }

    #[test]
    fn keeps_colon_separated_mac() {
        let id = DeviceId::from_platform("hci0/FF:FF:C2:0B:7D:1A");
        assert_eq!(id.as_str(), "FF:FF:C2:0B:7D:1A");
    }

    #[test]
    fn sanitizes_opaque_identifiers() {
        let id = DeviceId::from_platform("A1B2C3D4-0000 tag/#1+");
        assert_eq!(id.as_str(), "A1B2C3D4-0000_tag__1_");
    }
}
