//! Capability registry: the characteristics each connected tag exposes.

use std::collections::HashMap;

use uuid::Uuid;

use crate::core::bluetooth::device::TagCharacteristic;
use crate::core::bluetooth::types::{DeviceId, GattService};

pub struct CapabilityRegistry<C> {
    services: HashMap<DeviceId, Vec<GattService<C>>>,
}

impl<C: TagCharacteristic> CapabilityRegistry<C> {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Records the discovered services of a device, replacing earlier ones.
    pub fn register(&mut self, id: DeviceId, services: Vec<GattService<C>>) {
        self.services.insert(id, services);
    }

    pub fn remove(&mut self, id: &DeviceId) {
        self.services.remove(id);
    }

    /// Finds a characteristic by service and characteristic UUID.
    pub fn find(&self, id: &DeviceId, service: Uuid, characteristic: Uuid) -> Option<&C> {
        self.services
            .get(id)?
            .iter()
            .find(|s| s.uuid == service)?
            .characteristics
            .iter()
            .find(|c| c.uuid() == characteristic)
    }

    #[cfg(test)]
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.services.contains_key(id)
    }
}

impl<C: TagCharacteristic> Default for CapabilityRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
