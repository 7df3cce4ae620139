//! Device state table
//! One entry per tag from the start of a connection attempt until the
//! disconnect is handled. Every timer and background task of a tag is owned
//! by its entry, so removing the entry cancels all of them.

use std::collections::HashMap;
use std::time::Duration;

use crate::core::bluetooth::{DeviceId, TagPeripheral};
use crate::core::button::ClickDisambiguator;
use crate::core::timer::TaskGuard;

/// Where a tag is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    /// Link is up, waiting before GATT discovery
    Settling,
    Ready,
}

pub struct DeviceEntry<P: TagPeripheral> {
    pub peripheral: P,
    pub link: LinkState,
    /// Last known battery percentage
    pub battery: Option<u8>,
    pub clicks: ClickDisambiguator,
    pub pending_click: Option<TaskGuard>,
    pub rssi_poll: Option<TaskGuard>,
    pub pending_alert: Option<TaskGuard>,
    pub link_watch: Option<TaskGuard>,
    /// Connection setup, notification forwarders and one-shot GATT operations
    pub tasks: Vec<TaskGuard>,
}

impl<P: TagPeripheral> DeviceEntry<P> {
    pub fn new(peripheral: P, double_click_interval: Duration) -> Self {
        Self {
            peripheral,
            link: LinkState::Connecting,
            battery: None,
            clicks: ClickDisambiguator::new(double_click_interval),
            pending_click: None,
            rssi_poll: None,
            pending_alert: None,
            link_watch: None,
            tasks: Vec::new(),
        }
    }

    /// Keeps a task alive for as long as the entry, dropping finished ones.
    pub fn own(&mut self, task: TaskGuard) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}

pub struct DeviceTable<P: TagPeripheral> {
    entries: HashMap<DeviceId, DeviceEntry<P>>,
}

impl<P: TagPeripheral> DeviceTable<P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: DeviceId, entry: DeviceEntry<P>) {
        self.entries.insert(id, entry);
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceEntry<P>> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceEntry<P>> {
        self.entries.get_mut(id)
    }

    /// Removes an entry; dropping it cancels everything it owns.
    pub fn remove(&mut self, id: &DeviceId) -> Option<DeviceEntry<P>> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<P: TagPeripheral> Default for DeviceTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
