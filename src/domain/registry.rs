//! Device registry
//!
//! Deduplicated, insertion-ordered list of peripherals seen while scanning.

use crate::domain::models::{DiscoveredPeripheral, PeripheralHandle};
use tracing::{debug, info};

/// Name advertised by the heart-rate peripheral
pub const TARGET_DEVICE_NAME: &str = "HeartRate-Sense";

/// Admits peripherals whose advertised or resolved name equals the target.
///
/// Filtering by name instead of by service UUID keeps peripherals that leave
/// the service out of their advertisement packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    target_name: String,
}

impl DiscoveryFilter {
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn matches(&self, peripheral: &DiscoveredPeripheral) -> bool {
        let target = Some(self.target_name.as_str());
        peripheral.name.as_deref() == target || peripheral.local_name.as_deref() == target
    }
}

impl Default for DiscoveryFilter {
    fn default() -> Self {
        Self::new(TARGET_DEVICE_NAME)
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<PeripheralHandle>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scan sighting. Returns true if a new entry was added.
    pub fn on_discovered(
        &mut self,
        peripheral: &DiscoveredPeripheral,
        filter: &DiscoveryFilter,
    ) -> bool {
        if !filter.matches(peripheral) {
            return false;
        }
        if self.devices.iter().any(|d| d.id == peripheral.id) {
            debug!("Peripheral {} already listed", peripheral.id);
            return false;
        }

        let handle = peripheral.to_handle();
        info!("Discovered {}", handle);
        self.devices.push(handle);
        true
    }

    pub fn all(&self) -> &[PeripheralHandle] {
        &self.devices
    }

    pub fn reset(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
