//! Tag lifecycle manager
//! This module owns every piece of per-tag state and is the only place it is
//! mutated. Events from the scanner, per-tag tasks and the MQTT pump are
//! handled one at a time, in arrival order.

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::commands;
use crate::config::tag_config::TagConfig;
use crate::core::bluetooth::commands::{alert_duration, AlertController, AlertKind};
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::constants::{
    CONNECT_ALERT_MS, LINK_WATCH_INTERVAL, SETTLE_DELAY, TAG_NAME, UUID_ALERT_LEVEL,
    UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_BUTTON_CLICK, UUID_BUTTON_SERVICE,
    UUID_IMMEDIATE_ALERT_SERVICE, UUID_LINK_LOSS_SERVICE,
};
use crate::core::bluetooth::device::TagPeripheral;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::registry::CapabilityRegistry;
use crate::core::bluetooth::scanner::ScanHandle;
use crate::core::bluetooth::types::{
    Advertisement, BridgeEvent, DeviceId, GattService, NotificationKind,
};
use crate::core::button::{ClickEvent, PressOutcome};
use crate::core::timer::TaskGuard;
use crate::mqtt::{BusPublisher, TagPublisher};
use crate::state::{DeviceEntry, DeviceTable, LinkState};

/// True when an advertised name, trimmed and upper-cased, equals `expected`.
pub fn name_matches(advertised: Option<&str>, expected: &str) -> bool {
    advertised.is_some_and(|name| name.trim().to_uppercase() == expected)
}

/// Manages the lifecycle of every tag in range
pub struct TagManager<P: TagPeripheral, B: BusPublisher> {
    config: TagConfig,
    expected_name: String,
    devices: DeviceTable<P>,
    registry: CapabilityRegistry<P::Characteristic>,
    publisher: TagPublisher<B>,
    connections: ConnectionManager<P>,
    scan: ScanHandle,
    events: UnboundedSender<BridgeEvent<P>>,
}

impl<P: TagPeripheral, B: BusPublisher> TagManager<P, B> {
    pub fn new(
        config: TagConfig,
        publisher: TagPublisher<B>,
        scan: ScanHandle,
        events: UnboundedSender<BridgeEvent<P>>,
    ) -> Self {
        Self {
            config,
            expected_name: TAG_NAME.to_string(),
            devices: DeviceTable::new(),
            registry: CapabilityRegistry::new(),
            publisher,
            connections: ConnectionManager::new(events.clone(), SETTLE_DELAY),
            scan,
            events,
        }
    }

    /// Accepts tags advertising `name` instead of the iTAG name.
    #[cfg(test)]
    pub fn with_expected_name(mut self, name: &str) -> Self {
        self.expected_name = name.trim().to_uppercase();
        self
    }

    /// Handles events one at a time. The manager holds a sender of its own,
    /// so the channel never closes; callers stop it by dropping the future
    /// and then call `shutdown`.
    pub async fn run(&mut self, mut events: UnboundedReceiver<BridgeEvent<P>>) {
        info!("Tag manager started");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Drops every entry, cancelling all per-tag timers and tasks.
    pub fn shutdown(&mut self) {
        info!("Releasing {} tag(s)", self.devices.len());
        for id in self.devices.ids() {
            self.registry.remove(&id);
        }
        self.devices.clear();
    }

    pub async fn handle_event(&mut self, event: BridgeEvent<P>) {
        match event {
            BridgeEvent::Discovered(advertisement) => self.on_discovered(advertisement).await,
            BridgeEvent::Connected { id } => self.on_connected(id).await,
            BridgeEvent::ConnectFailed { id, reason } => self.on_connect_failed(id, reason),
            BridgeEvent::ServicesDiscovered { id, services } => {
                self.on_services_discovered(id, services).await
            }
            BridgeEvent::SetupFailed { id, reason } => {
                error!("Service discovery on {} failed: {}", id, reason)
            }
            BridgeEvent::Disconnected { id } => self.on_disconnected(id).await,
            BridgeEvent::ButtonPressed { id } => self.on_button_pressed(id).await,
            BridgeEvent::ClickWindowElapsed { id, epoch } => {
                self.on_click_window_elapsed(id, epoch).await
            }
            BridgeEvent::BatteryLevel { id, level } => self.on_battery_level(id, level).await,
            BridgeEvent::Rssi { id, rssi } => self.on_rssi(id, rssi).await,
            BridgeEvent::LinkLossReset { id } => self.on_link_loss_reset(id),
            BridgeEvent::BusConnected => self.on_bus_connected().await,
            BridgeEvent::BusMessage { topic, payload } => self.on_bus_message(&topic, &payload),
        }
    }

    /// Number of tags with a live entry
    pub fn tracked(&self) -> usize {
        self.devices.len()
    }

    pub fn battery(&self, id: &DeviceId) -> Option<u8> {
        self.devices.get(id).and_then(|entry| entry.battery)
    }

    pub fn link_state(&self, id: &DeviceId) -> Option<LinkState> {
        self.devices.get(id).map(|entry| entry.link)
    }

    /// Sounds the beeping alert for `duration_ms`.
    pub fn beep(&mut self, id: &DeviceId, duration_ms: i64) {
        self.alert(id, AlertKind::Beep, duration_ms);
    }

    /// Sounds the continuous alert for `duration_ms`.
    pub fn continuous(&mut self, id: &DeviceId, duration_ms: i64) {
        self.alert(id, AlertKind::Continuous, duration_ms);
    }

    async fn on_discovered(&mut self, advertisement: Advertisement<P>) {
        let peripheral = advertisement.peripheral;
        let id = peripheral.id();
        debug!(
            "Discovered id: {} localName: {:?} rssi: {:?}",
            id, advertisement.local_name, advertisement.rssi
        );

        if !name_matches(advertisement.local_name.as_deref(), &self.expected_name) {
            return;
        }
        if self.devices.contains(&id) || peripheral.is_connected().await {
            return;
        }

        info!("Tag {} found, connecting", id);
        // the radio cannot scan while a connection is being set up
        self.scan.pause();

        let mut entry = DeviceEntry::new(peripheral.clone(), self.config.double_click_interval());
        entry.own(self.connections.spawn_connect(peripheral));
        self.devices.insert(id, entry);
    }

    async fn on_connected(&mut self, id: DeviceId) {
        if !self.devices.contains(&id) {
            return;
        }
        debug!("Tag {} connected", id);
        self.publisher.presence(&id, true).await;
        self.publisher.subscribe_alerts(&id).await;

        let Some(entry) = self.devices.get_mut(&id) else {
            return;
        };
        entry.link = LinkState::Settling;

        let events = self.events.clone();
        let peripheral = entry.peripheral.clone();
        let poll_id = id.clone();
        entry.rssi_poll = Some(TaskGuard::every(
            self.config.rssi_update_interval(),
            move || {
                let events = events.clone();
                let peripheral = peripheral.clone();
                let id = poll_id.clone();
                async move {
                    match peripheral.read_rssi().await {
                        Ok(rssi) => {
                            let _ = events.send(BridgeEvent::Rssi { id, rssi });
                        }
                        Err(e) => warn!("Failed to read RSSI of {}: {}", id, e),
                    }
                }
            },
        ));
        entry.link_watch = Some(
            self.connections
                .spawn_link_watch(entry.peripheral.clone(), LINK_WATCH_INTERVAL),
        );
    }

    fn on_connect_failed(&mut self, id: DeviceId, reason: String) {
        error!("Failed to connect to {}: {}", id, reason);
        self.devices.remove(&id);
    }

    async fn on_services_discovered(
        &mut self,
        id: DeviceId,
        services: Vec<GattService<P::Characteristic>>,
    ) {
        if !self.devices.contains(&id) {
            debug!("Discarding services of {}, it is gone", id);
            return;
        }
        self.registry.register(id.clone(), services);

        let button = self
            .registry
            .find(&id, UUID_BUTTON_SERVICE, UUID_BUTTON_CLICK)
            .cloned();
        let battery = self
            .registry
            .find(&id, UUID_BATTERY_SERVICE, UUID_BATTERY_LEVEL)
            .cloned();
        let link_loss = self
            .registry
            .find(&id, UUID_LINK_LOSS_SERVICE, UUID_ALERT_LEVEL)
            .cloned();

        let Some(entry) = self.devices.get_mut(&id) else {
            return;
        };
        entry.link = LinkState::Ready;
        let notifications = NotificationHandler::new(id.clone(), self.events.clone());

        match button {
            Some(button) => entry.own(notifications.spawn(button, NotificationKind::Button)),
            None => warn!("{} exposes no button characteristic", id),
        }
        if let Some(battery) = battery {
            entry.own(notifications.spawn(battery.clone(), NotificationKind::Battery));
            entry.own(self.connections.spawn_battery_read(id.clone(), battery));
        }
        if let Some(link_loss) = link_loss {
            entry.own(self.connections.spawn_link_loss_reset(id.clone(), link_loss));
        }

        info!("Tag {} ready", id);
        self.publisher.announce(&id).await;
    }

    async fn on_disconnected(&mut self, id: DeviceId) {
        let Some(entry) = self.devices.remove(&id) else {
            return;
        };
        warn!("Tag {} disconnected", id);
        // dropping the entry cancels its poll, click and alert timers
        drop(entry);
        self.registry.remove(&id);

        self.publisher.retract(&id).await;
        self.publisher.unsubscribe_alerts(&id).await;
    }

    async fn on_button_pressed(&mut self, id: DeviceId) {
        let Some(entry) = self.devices.get_mut(&id) else {
            return;
        };
        info!("Tag {} button clicked", id);

        let click = match entry.clicks.press(Instant::now()) {
            PressOutcome::WindowOpened { epoch, window } => {
                entry.pending_click = Some(click_timer(&self.events, id.clone(), epoch, window));
                None
            }
            PressOutcome::WindowRestarted { epoch, window } => {
                entry.pending_click = Some(click_timer(&self.events, id.clone(), epoch, window));
                info!("Tag {} clicked once", id);
                Some(ClickEvent::Single)
            }
            PressOutcome::DoubleClick { interval } => {
                entry.pending_click = None;
                info!("Tag {} clicked twice - click interval = {:?}", id, interval);
                Some(ClickEvent::Double)
            }
        };

        if let Some(click) = click {
            self.publisher.click(&id, click).await;
        }
    }

    async fn on_click_window_elapsed(&mut self, id: DeviceId, epoch: u64) {
        let Some(entry) = self.devices.get_mut(&id) else {
            return;
        };
        let Some(click) = entry.clicks.window_elapsed(epoch) else {
            return;
        };
        entry.pending_click = None;
        info!("Tag {} clicked once", id);
        self.publisher.click(&id, click).await;
    }

    async fn on_battery_level(&mut self, id: DeviceId, level: u8) {
        let Some(entry) = self.devices.get_mut(&id) else {
            return;
        };
        entry.battery = Some(level);
        info!("Tag {} battery level = {}%", id, level);
        self.publisher.battery(&id, level).await;
    }

    async fn on_rssi(&mut self, id: DeviceId, rssi: i16) {
        let Some(entry) = self.devices.get(&id) else {
            return;
        };
        // valid readings are always negative
        if rssi >= 0 {
            debug!("Ignoring RSSI {} of {}", rssi, id);
            return;
        }
        let battery = entry.battery;
        info!("Tag {} rssi: {} battery: {:?}", id, rssi, battery);

        self.publisher.rssi(&id, rssi).await;
        self.publisher.presence(&id, true).await;
        if let Some(level) = battery {
            self.publisher.battery(&id, level).await;
        }
    }

    fn on_link_loss_reset(&mut self, id: DeviceId) {
        if self.config.beep_on_connect {
            self.alert(&id, AlertKind::Continuous, CONNECT_ALERT_MS);
        }
    }

    async fn on_bus_connected(&mut self) {
        for id in self.devices.ids() {
            if self.link_state(&id) != Some(LinkState::Connecting) {
                self.publisher.subscribe_alerts(&id).await;
            }
        }
    }

    fn on_bus_message(&mut self, topic: &str, payload: &[u8]) {
        if let Some(request) = commands::parse_alert(topic, payload) {
            self.alert(&request.id, request.kind, request.duration_ms);
        }
    }

    /// Starts an alert on a tag's immediate-alert characteristic. A newer
    /// alert on the same tag replaces the older one, pending "off" write
    /// included.
    fn alert(&mut self, id: &DeviceId, kind: AlertKind, duration_ms: i64) {
        debug!("Tag {} {} {}", id, kind.as_str(), duration_ms);
        let duration = match alert_duration(duration_ms) {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Ignoring alert for {}: {}", id, e);
                return;
            }
        };
        let Some(alert_level) = self
            .registry
            .find(id, UUID_IMMEDIATE_ALERT_SERVICE, UUID_ALERT_LEVEL)
            .cloned()
        else {
            debug!("Tag {} has no immediate alert characteristic", id);
            return;
        };
        let Some(entry) = self.devices.get_mut(id) else {
            return;
        };

        let controller = AlertController::new(alert_level);
        let alert_id = id.clone();
        entry.pending_alert = Some(TaskGuard::spawn(async move {
            if let Err(e) = controller.sound(kind, duration).await {
                error!("Alert on {} failed: {}", alert_id, e);
            }
        }));
    }
}

fn click_timer<P: TagPeripheral>(
    events: &UnboundedSender<BridgeEvent<P>>,
    id: DeviceId,
    epoch: u64,
    window: std::time::Duration,
) -> TaskGuard {
    let events = events.clone();
    TaskGuard::after(window, move || async move {
        let _ = events.send(BridgeEvent::ClickWindowElapsed { id, epoch });
    })
}
