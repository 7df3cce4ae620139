//! Bluetooth functionality for the iTAG bridge
//! This module handles all bluetooth operations including scanning,
//! connecting, GATT setup and receiving notifications from the tags.

pub mod commands;
pub mod connection;
pub mod constants;
pub mod device;
pub mod manager;
pub mod notification;
pub mod registry;
pub mod scanner;
pub mod types;

// Re-export types that should be publicly accessible
pub use commands::{AlertController, AlertKind, AlertLevel};
pub use connection::{BluestTag, ConnectionManager};
pub use constants::*; // Re-export all constants
pub use device::{TagAdapter, TagCharacteristic, TagPeripheral};
pub use manager::TagManager;
pub use notification::NotificationHandler;
pub use registry::CapabilityRegistry;
pub use scanner::{ScanController, ScanHandle};
pub use types::{Advertisement, BridgeEvent, DeviceId, GattService, NotificationKind};
