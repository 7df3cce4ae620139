//! Bluetooth connection handling for the tag
//! This module runs the connect / settle / discover sequence and the one-shot
//! GATT operations of a fresh connection, and implements the BLE seams on
//! top of bluest.

use std::time::Duration;

use anyhow::Result;
use bluest::{Adapter, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;

use crate::core::bluetooth::commands::{AlertController, AlertLevel};
use crate::core::bluetooth::device::{TagAdapter, TagCharacteristic, TagPeripheral};
use crate::core::bluetooth::types::{Advertisement, BridgeEvent, DeviceId, GattService};
use crate::core::timer::TaskGuard;
use crate::error::BridgeError;

const SCAN_CHANNEL_CAPACITY: usize = 64;

/// Connection manager for tags
#[derive(Clone)]
pub struct ConnectionManager<P: TagPeripheral> {
    events: UnboundedSender<BridgeEvent<P>>,
    settle_delay: Duration,
}

impl<P: TagPeripheral> ConnectionManager<P> {
    pub fn new(events: UnboundedSender<BridgeEvent<P>>, settle_delay: Duration) -> Self {
        Self {
            events,
            settle_delay,
        }
    }

    /// Starts connecting in the background. Progress is reported as
    /// `Connected`, then `ServicesDiscovered`, or a failure event.
    pub fn spawn_connect(&self, peripheral: P) -> TaskGuard {
        let manager = self.clone();
        TaskGuard::spawn(async move {
            manager.establish(peripheral).await;
        })
    }

    async fn establish(&self, peripheral: P) {
        let id = peripheral.id();
        info!("Initiating connection to {}...", id);

        if let Err(e) = peripheral.connect().await {
            let _ = self.events.send(BridgeEvent::ConnectFailed {
                id,
                reason: e.to_string(),
            });
            return;
        }
        if self.events.send(BridgeEvent::Connected { id: id.clone() }).is_err() {
            return;
        }

        sleep(self.settle_delay).await;

        info!("Connection to {} up, discovering services...", id);
        let event = match peripheral.discover_services().await {
            Ok(services) => {
                for service in &services {
                    debug!(
                        "{} service {} with {} characteristics",
                        id,
                        service.uuid,
                        service.characteristics.len()
                    );
                }
                BridgeEvent::ServicesDiscovered { id, services }
            }
            Err(e) => BridgeEvent::SetupFailed {
                id,
                reason: e.to_string(),
            },
        };
        let _ = self.events.send(event);
    }

    /// Reads the battery level once.
    pub fn spawn_battery_read(&self, id: DeviceId, battery: P::Characteristic) -> TaskGuard {
        let events = self.events.clone();
        TaskGuard::spawn(async move {
            match battery.read().await {
                Ok(value) => match value.first() {
                    Some(&level) => {
                        let _ = events.send(BridgeEvent::BatteryLevel { id, level });
                    }
                    None => warn!("{}", BridgeError::EmptyPayload(id)),
                },
                Err(e) => error!("Failed to read battery level of {}: {}", id, e),
            }
        })
    }

    /// Turns the link-loss alarm off so the tag stays quiet when it goes out
    /// of range. Reports `LinkLossReset` once the write is accepted.
    pub fn spawn_link_loss_reset(&self, id: DeviceId, alert_level: P::Characteristic) -> TaskGuard {
        let events = self.events.clone();
        TaskGuard::spawn(async move {
            let controller = AlertController::new(alert_level);
            match controller.set_level(AlertLevel::NoAlert).await {
                Ok(()) => {
                    debug!("{} link loss alert level write success", id);
                    let _ = events.send(BridgeEvent::LinkLossReset { id });
                }
                Err(e) => error!("Failed to reset link loss alert of {}: {}", id, e),
            }
        })
    }

    /// Polls the link state until it drops, then reports `Disconnected`.
    pub fn spawn_link_watch(&self, peripheral: P, interval: Duration) -> TaskGuard {
        let events = self.events.clone();
        TaskGuard::spawn(async move {
            loop {
                sleep(interval).await;
                if !peripheral.is_connected().await {
                    let _ = events.send(BridgeEvent::Disconnected { id: peripheral.id() });
                    return;
                }
            }
        })
    }
}

/// A tag reached through bluest
#[derive(Clone)]
pub struct BluestTag {
    adapter: Adapter,
    device: Device,
}

impl BluestTag {
    pub fn new(adapter: Adapter, device: Device) -> Self {
        Self { adapter, device }
    }
}

#[async_trait::async_trait]
impl TagAdapter for Adapter {
    type Peripheral = BluestTag;

    async fn wait_available(&self) -> Result<()> {
        Adapter::wait_available(self).await?;
        Ok(())
    }

    async fn scan(&self) -> Result<mpsc::Receiver<Advertisement<BluestTag>>> {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let adapter = self.clone();

        tokio::spawn(async move {
            let mut scan_stream = match Adapter::scan(&adapter, &[]).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while let Some(discovered) = scan_stream.next().await {
                let local_name = discovered
                    .adv_data
                    .local_name
                    .or_else(|| discovered.device.name().ok());
                let advertisement = Advertisement {
                    peripheral: BluestTag::new(adapter.clone(), discovered.device),
                    local_name,
                    rssi: discovered.rssi,
                };
                // the scan stops once the receiver is gone
                if tx.send(advertisement).await.is_err() {
                    break;
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| BridgeError::SubscriptionDropped)??;
        Ok(rx)
    }
}

#[async_trait::async_trait]
impl TagPeripheral for BluestTag {
    type Characteristic = Characteristic;

    fn id(&self) -> DeviceId {
        DeviceId::from_platform(&self.device.id().to_string())
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn connect(&self) -> Result<()> {
        self.adapter.connect_device(&self.device).await?;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService<Characteristic>>> {
        let mut discovered = Vec::new();
        for service in self.device.services().await? {
            let characteristics = service.characteristics().await?;
            discovered.push(GattService::new(service.uuid(), characteristics));
        }
        Ok(discovered)
    }

    async fn read_rssi(&self) -> Result<i16> {
        Ok(self.device.rssi().await?)
    }
}

#[async_trait::async_trait]
impl TagCharacteristic for Characteristic {
    fn uuid(&self) -> Uuid {
        Characteristic::uuid(self)
    }

    async fn read(&self) -> Result<Vec<u8>> {
        Ok(Characteristic::read(self).await?)
    }

    async fn write_without_response(&self, value: &[u8]) -> Result<()> {
        Characteristic::write_without_response(self, value).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Vec<u8>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let characteristic = self.clone();

        tokio::spawn(async move {
            let mut notification_stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while let Some(result) = notification_stream.next().await {
                match result {
                    Ok(value) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| BridgeError::SubscriptionDropped)??;
        Ok(rx)
    }
}
