//! Permission Gate
//!
//! Scanning and connecting need runtime grants on Android; older releases
//! gate BLE scanning behind location access, API level 31 and later split it
//! into separate scan and connect grants. Desktop platforms mediate adapter
//! access themselves and need nothing from us.

use std::process::Command;
use tracing::{info, warn};

/// First Android API level with the dedicated Bluetooth scan/connect grants
pub const ANDROID_12_API_LEVEL: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Desktop,
    Android { api_level: u32 },
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android {
                api_level: android_api_level().unwrap_or(ANDROID_12_API_LEVEL),
            }
        } else {
            Platform::Desktop
        }
    }

    /// Grants that must all succeed before scanning
    pub fn required_capabilities(&self) -> &'static [Capability] {
        match self {
            Platform::Desktop => &[],
            Platform::Android { api_level } if *api_level < ANDROID_12_API_LEVEL => {
                &[Capability::FineLocation]
            }
            Platform::Android { .. } => &[Capability::BluetoothScan, Capability::BluetoothConnect],
        }
    }
}

fn android_api_level() -> Option<u32> {
    let output = Command::new("getprop")
        .arg("ro.build.version.sdk")
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FineLocation,
    BluetoothScan,
    BluetoothConnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    NeverAskAgain,
}

/// Issues one platform permission request, possibly showing a consent prompt
pub trait PermissionProvider: Send {
    fn request(&mut self, capability: Capability) -> PermissionStatus;
}

/// Provider for hosts where the OS prompts on first adapter use
#[derive(Debug, Default)]
pub struct HostPermissions;

impl PermissionProvider for HostPermissions {
    fn request(&mut self, _capability: Capability) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

pub struct PermissionGate {
    platform: Platform,
    provider: Box<dyn PermissionProvider>,
}

impl PermissionGate {
    pub fn new(platform: Platform, provider: impl PermissionProvider + 'static) -> Self {
        Self {
            platform,
            provider: Box::new(provider),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Request every grant the platform needs. Single shot: a denial is
    /// reported, not retried.
    pub fn request_authorization(&mut self) -> bool {
        let required = self.platform.required_capabilities();
        if required.is_empty() {
            return true;
        }

        // Every prompt is shown even after an earlier denial
        let statuses: Vec<PermissionStatus> = required
            .iter()
            .map(|capability| {
                let status = self.provider.request(*capability);
                info!("Permission {:?}: {:?}", capability, status);
                status
            })
            .collect();

        let granted = statuses.iter().all(|s| *s == PermissionStatus::Granted);
        if !granted {
            warn!("Bluetooth permissions denied on {:?}", self.platform);
        }
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct ScriptedPermissions {
        answers: HashMap<Capability, PermissionStatus>,
        asked: Arc<Mutex<Vec<Capability>>>,
    }

    impl PermissionProvider for ScriptedPermissions {
        fn request(&mut self, capability: Capability) -> PermissionStatus {
            self.asked.lock().unwrap().push(capability);
            self.answers
                .get(&capability)
                .copied()
                .unwrap_or(PermissionStatus::Denied)
        }
    }

    fn gate(
        platform: Platform,
        answers: &[(Capability, PermissionStatus)],
    ) -> (PermissionGate, Arc<Mutex<Vec<Capability>>>) {
        let asked = Arc::new(Mutex::new(Vec::new()));
        let provider = ScriptedPermissions {
            answers: answers.iter().copied().collect(),
            asked: asked.clone(),
        };
        (PermissionGate::new(platform, provider), asked)
    }

    #[test]
    fn test_desktop_needs_nothing() {
        let (mut gate, asked) = gate(Platform::Desktop, &[]);
        assert!(gate.request_authorization());
        assert!(asked.lock().unwrap().is_empty());
    }

    #[test]
    fn test_old_android_asks_for_location() {
        let (mut gate, asked) = gate(
            Platform::Android { api_level: 30 },
            &[(Capability::FineLocation, PermissionStatus::Granted)],
        );
        assert!(gate.request_authorization());
        assert_eq!(*asked.lock().unwrap(), vec![Capability::FineLocation]);
    }

    #[test]
    fn test_new_android_needs_both_grants() {
        let (mut gate, asked) = gate(
            Platform::Android { api_level: 33 },
            &[
                (Capability::BluetoothScan, PermissionStatus::Granted),
                (Capability::BluetoothConnect, PermissionStatus::Granted),
            ],
        );
        assert!(gate.request_authorization());
        assert_eq!(
            *asked.lock().unwrap(),
            vec![Capability::BluetoothScan, Capability::BluetoothConnect]
        );
    }

    #[test]
    fn test_denial_still_asks_remaining() {
        let (mut gate, asked) = gate(
            Platform::Android { api_level: 31 },
            &[
                (Capability::BluetoothScan, PermissionStatus::Denied),
                (Capability::BluetoothConnect, PermissionStatus::Granted),
            ],
        );
        assert!(!gate.request_authorization());
        assert_eq!(asked.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_never_ask_again_is_a_denial() {
        let (mut gate, _) = gate(
            Platform::Android { api_level: 29 },
            &[(Capability::FineLocation, PermissionStatus::NeverAskAgain)],
        );
        assert!(!gate.request_authorization());
    }

    #[test]
    fn test_host_permissions_grant() {
        let mut gate = PermissionGate::new(Platform::Android { api_level: 34 }, HostPermissions);
        assert!(gate.request_authorization());
        assert_eq!(gate.platform(), Platform::Android { api_level: 34 });
    }
}
