//! Notification handling for the tag
//! This module subscribes to notifying characteristics and forwards every
//! value into the lifecycle manager's event channel.

use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::bluetooth::device::{TagCharacteristic, TagPeripheral};
use crate::core::bluetooth::types::{BridgeEvent, DeviceId, NotificationKind};
use crate::core::timer::TaskGuard;

/// Notification handler for one tag
#[derive(Clone)]
pub struct NotificationHandler<P: TagPeripheral> {
    id: DeviceId,
    events: UnboundedSender<BridgeEvent<P>>,
}

impl<P: TagPeripheral> NotificationHandler<P> {
    pub fn new(id: DeviceId, events: UnboundedSender<BridgeEvent<P>>) -> Self {
        Self { id, events }
    }

    /// Subscribes to `characteristic` in a background task. A failed
    /// subscription is logged and ends the task.
    pub fn spawn(&self, characteristic: P::Characteristic, kind: NotificationKind) -> TaskGuard {
        let handler = self.clone();
        TaskGuard::spawn(async move {
            handler.process_notifications(characteristic, kind).await;
        })
    }

    async fn process_notifications(&self, characteristic: P::Characteristic, kind: NotificationKind) {
        let mut notifications = match characteristic.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                error!("Failed to subscribe to {:?} notifications of {}: {}", kind, self.id, e);
                return;
            }
        };
        info!("Listening for {:?} notifications of {}", kind, self.id);

        while let Some(value) = notifications.recv().await {
            debug!("{} {:?} notification: {:?}", self.id, kind, value);
            let Some(event) = self.translate(kind, &value) else {
                continue;
            };
            if self.events.send(event).is_err() {
                return;
            }
        }

        info!("{:?} notification stream of {} ended", kind, self.id);
    }

    fn translate(&self, kind: NotificationKind, value: &[u8]) -> Option<BridgeEvent<P>> {
        let id = self.id.clone();
        match kind {
            NotificationKind::Button => Some(BridgeEvent::ButtonPressed { id }),
            NotificationKind::Battery => match value.first() {
                Some(&level) => Some(BridgeEvent::BatteryLevel { id, level }),
                None => {
                    warn!("Empty battery notification from {}", id);
                    None
                }
            },
        }
    }
}
