//! The BLE operations the bridge depends on.
//!
//! The lifecycle only talks to these traits; `connection.rs` implements them
//! on top of bluest and the tests implement them in memory.

use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::types::{Advertisement, DeviceId, GattService};

/// The local radio
#[async_trait::async_trait]
pub trait TagAdapter: Send + Sync + 'static {
    type Peripheral: TagPeripheral;

    /// Resolves once the radio is powered on.
    async fn wait_available(&self) -> Result<()>;

    /// Starts scanning without a service filter, duplicates included.
    /// Scanning stops when the receiver is dropped.
    async fn scan(&self) -> Result<mpsc::Receiver<Advertisement<Self::Peripheral>>>;
}

/// A remote tag
#[async_trait::async_trait]
pub trait TagPeripheral: Clone + Send + Sync + 'static {
    type Characteristic: TagCharacteristic;

    fn id(&self) -> DeviceId;

    async fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<()>;

    /// Discovers every service and every characteristic of each service.
    async fn discover_services(&self) -> Result<Vec<GattService<Self::Characteristic>>>;

    async fn read_rssi(&self) -> Result<i16>;
}

/// A characteristic of a connected tag
#[async_trait::async_trait]
pub trait TagCharacteristic: Clone + Send + Sync + 'static {
    fn uuid(&self) -> Uuid;

    async fn read(&self) -> Result<Vec<u8>>;

    /// Resolves once the stack accepted the write.
    async fn write_without_response(&self, value: &[u8]) -> Result<()>;

    /// Enables notifications. Each notified value arrives on the receiver until
    /// the link drops or the receiver is dropped.
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Vec<u8>>>;
}
