//! Constants used throughout the application
//! This module contains the GATT layout of an iTAG and the fixed delays
//! of the connection lifecycle.

use std::time::Duration;

use uuid::Uuid;

/// Advertised name of an iTAG, compared after trimming and upper-casing
pub const TAG_NAME: &str = "ITAG";

/// Button service and its click characteristic
pub const UUID_BUTTON_SERVICE: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
pub const UUID_BUTTON_CLICK: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Service UUIDs
pub const UUID_IMMEDIATE_ALERT_SERVICE: Uuid =
    Uuid::from_u128(0x00001802_0000_1000_8000_00805f9b34fb);
pub const UUID_LINK_LOSS_SERVICE: Uuid = Uuid::from_u128(0x00001803_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_ALERT_LEVEL: Uuid = Uuid::from_u128(0x00002a06_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Pause between link-up and GATT discovery; tags drop the link otherwise
pub const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Pause before scanning resumes after it stopped
pub const SCAN_RESTART_DELAY: Duration = Duration::from_secs(3);

/// How often a connected tag's link state is checked
pub const LINK_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Accepted alert durations in milliseconds, inclusive
pub const MIN_ALERT_MS: i64 = 100;
pub const MAX_ALERT_MS: i64 = 600_000;

/// Length of the alert sounded after setup when beep-on-connect is enabled
pub const CONNECT_ALERT_MS: i64 = 200;
