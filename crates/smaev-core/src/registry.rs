// ── Device registry ──
//
// Maps stable device ids to running coordinators so device-targeted
// commands can find their target. The host passes the registry to
// whatever dispatches those commands; there is no ambient global lookup.

use dashmap::DashMap;

use crate::coordinator::Coordinator;
use crate::error::CoreError;

/// Running coordinators, keyed by the charger serial.
#[derive(Default)]
pub struct DeviceRegistry {
    coordinators: DashMap<String, Coordinator>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a coordinator under its stable device id.
    pub fn insert(&self, coordinator: Coordinator) {
        self.coordinators.insert(coordinator.device().id.clone(), coordinator);
    }

    /// Look up a coordinator by device id.
    pub fn get(&self, device_id: &str) -> Option<Coordinator> {
        self.coordinators.get(device_id).map(|entry| entry.value().clone())
    }

    /// Remove a coordinator, returning it so the caller can stop it.
    pub fn remove(&self, device_id: &str) -> Option<Coordinator> {
        self.coordinators.remove(device_id).map(|(_, coordinator)| coordinator)
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Restart the addressed charger through its restart channel.
    pub async fn restart_device(&self, device_id: &str) -> Result<(), CoreError> {
        // Clone out of the map before awaiting; dashmap guards must not
        // be held across suspension points.
        let coordinator = self
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound { device_id: device_id.to_owned() })?;
        coordinator.restart_device().await
    }
}
