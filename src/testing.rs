//! In-memory stand-ins for the radio and the broker.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::bluetooth::constants::*;
use crate::core::bluetooth::{
    Advertisement, DeviceId, GattService, TagAdapter, TagCharacteristic, TagPeripheral,
};
use crate::mqtt::BusPublisher;

const WAIT_ROUNDS: usize = 1_000;

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..WAIT_ROUNDS {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {what}");
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub value: Vec<u8>,
    pub at: Instant,
}

#[derive(Default)]
struct CharacteristicState {
    writes: Vec<WriteRecord>,
    reads: usize,
    read_value: Option<Vec<u8>>,
    fail_writes: bool,
    fail_subscribe: bool,
    subscribers: Vec<mpsc::UnboundedSender<Vec<u8>>>,
}

#[derive(Clone)]
pub struct FakeCharacteristic {
    uuid: Uuid,
    state: Arc<Mutex<CharacteristicState>>,
}

impl FakeCharacteristic {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            state: Arc::default(),
        }
    }

    pub fn with_read_value(self, value: Vec<u8>) -> Self {
        self.state.lock().unwrap().read_value = Some(value);
        self
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscribe = fail;
    }

    /// Accepted writes, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|s| !s.is_closed());
        state.subscribers.len()
    }

    /// Delivers a notification to every live subscriber.
    pub fn notify(&self, value: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|s| s.send(value.to_vec()).is_ok());
    }

    pub async fn wait_for_subscriber(&self) {
        wait_until(|| self.subscriber_count() > 0, "a subscriber").await;
    }
}

#[async_trait::async_trait]
impl TagCharacteristic for FakeCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        state
            .read_value
            .clone()
            .ok_or_else(|| anyhow!("characteristic is not readable"))
    }

    async fn write_without_response(&self, value: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(anyhow!("write rejected"));
        }
        state.writes.push(WriteRecord {
            value: value.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_subscribe {
            return Err(anyhow!("subscribe rejected"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        Ok(rx)
    }
}

struct PeripheralState {
    connected: bool,
    fail_connect: bool,
    fail_discovery: bool,
    rssi: i16,
    rssi_reads: usize,
    connect_calls: usize,
    discover_at: Option<Instant>,
    services: Vec<GattService<FakeCharacteristic>>,
}

#[derive(Clone)]
pub struct FakePeripheral {
    id: DeviceId,
    state: Arc<Mutex<PeripheralState>>,
}

impl FakePeripheral {
    pub fn with_services(id: &str, services: Vec<GattService<FakeCharacteristic>>) -> Self {
        Self {
            id: DeviceId::new(id),
            state: Arc::new(Mutex::new(PeripheralState {
                connected: false,
                fail_connect: false,
                fail_discovery: false,
                rssi: -60,
                rssi_reads: 0,
                connect_calls: 0,
                discover_at: None,
                services,
            })),
        }
    }

    /// A tag with the full iTAG GATT table and a battery at 87 %.
    pub fn itag(id: &str) -> Self {
        Self::with_services(
            id,
            vec![
                GattService::new(
                    UUID_BUTTON_SERVICE,
                    vec![FakeCharacteristic::new(UUID_BUTTON_CLICK)],
                ),
                GattService::new(
                    UUID_BATTERY_SERVICE,
                    vec![FakeCharacteristic::new(UUID_BATTERY_LEVEL).with_read_value(vec![87])],
                ),
                GattService::new(
                    UUID_IMMEDIATE_ALERT_SERVICE,
                    vec![FakeCharacteristic::new(UUID_ALERT_LEVEL)],
                ),
                GattService::new(
                    UUID_LINK_LOSS_SERVICE,
                    vec![FakeCharacteristic::new(UUID_ALERT_LEVEL)],
                ),
            ],
        )
    }

    pub fn characteristic(&self, service: Uuid, characteristic: Uuid) -> FakeCharacteristic {
        self.state
            .lock()
            .unwrap()
            .services
            .iter()
            .find(|s| s.uuid == service)
            .and_then(|s| s.characteristics.iter().find(|c| c.uuid == characteristic))
            .cloned()
            .expect("fake tag lacks the requested characteristic")
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn fail_discovery(&self, fail: bool) {
        self.state.lock().unwrap().fail_discovery = fail;
    }

    pub fn set_rssi(&self, rssi: i16) {
        self.state.lock().unwrap().rssi = rssi;
    }

    pub fn rssi_reads(&self) -> usize {
        self.state.lock().unwrap().rssi_reads
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn discover_at(&self) -> Option<Instant> {
        self.state.lock().unwrap().discover_at
    }
}

#[async_trait::async_trait]
impl TagPeripheral for FakePeripheral {
    type Characteristic = FakeCharacteristic;

    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(anyhow!("connection refused"));
        }
        state.connected = true;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService<FakeCharacteristic>>> {
        let mut state = self.state.lock().unwrap();
        state.discover_at = Some(Instant::now());
        if state.fail_discovery {
            return Err(anyhow!("GATT discovery timed out"));
        }
        Ok(state.services.clone())
    }

    async fn read_rssi(&self) -> Result<i16> {
        let mut state = self.state.lock().unwrap();
        state.rssi_reads += 1;
        Ok(state.rssi)
    }
}

#[derive(Default)]
struct AdapterState {
    scan_calls: usize,
    sender: Option<mpsc::Sender<Advertisement<FakePeripheral>>>,
}

#[derive(Default)]
pub struct FakeAdapter {
    state: Mutex<AdapterState>,
}

impl FakeAdapter {
    pub fn scan_calls(&self) -> usize {
        self.state.lock().unwrap().scan_calls
    }

    pub async fn wait_for_scan(&self, calls: usize) {
        wait_until(
            || {
                let state = self.state.lock().unwrap();
                state.scan_calls >= calls && state.sender.is_some()
            },
            "a scan session",
        )
        .await;
    }

    pub fn advertise(&self, peripheral: FakePeripheral, local_name: Option<&str>) {
        let state = self.state.lock().unwrap();
        let sender = state.sender.as_ref().expect("no scan session running");
        sender
            .try_send(Advertisement {
                peripheral,
                local_name: local_name.map(str::to_string),
                rssi: Some(-60),
            })
            .expect("scan channel full or closed");
    }

    /// Ends the running scan session as the stack would.
    pub fn end_scan(&self) {
        self.state.lock().unwrap().sender = None;
    }
}

#[async_trait::async_trait]
impl TagAdapter for FakeAdapter {
    type Peripheral = FakePeripheral;

    async fn wait_available(&self) -> Result<()> {
        Ok(())
    }

    async fn scan(&self) -> Result<mpsc::Receiver<Advertisement<FakePeripheral>>> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.state.lock().unwrap();
        state.scan_calls += 1;
        state.sender = Some(tx);
        Ok(rx)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
    pub at: Instant,
}

#[derive(Default)]
struct BusState {
    published: Vec<Published>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    fail_publishes: bool,
}

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    state: Arc<Mutex<BusState>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<Published> {
        self.state.lock().unwrap().published.clone()
    }

    /// Payloads published on `topic`, oldest first
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload)
            .collect()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().unsubscribed.clone()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state.lock().unwrap().fail_publishes = fail;
    }
}

#[async_trait::async_trait]
impl BusPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_publishes {
            return Err(anyhow!("broker unavailable"));
        }
        state.published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.state.lock().unwrap().subscribed.extend_from_slice(topics);
        Ok(())
    }

    async fn unsubscribe(&self, topics: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .unsubscribed
            .extend_from_slice(topics);
        Ok(())
    }
}
