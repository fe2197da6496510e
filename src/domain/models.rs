use std::fmt;

/// A peripheral admitted to the device list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralHandle {
    /// Transport-level address, opaque to everything but the transport
    pub id: String,
    pub name: Option<String>,
}

impl PeripheralHandle {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

/// A single sighting reported by the transport while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    pub id: String,
    /// Name resolved by the platform (GAP device name)
    pub name: Option<String>,
    /// Name carried in the advertisement packet
    pub local_name: Option<String>,
}

impl DiscoveredPeripheral {
    pub fn to_handle(&self) -> PeripheralHandle {
        PeripheralHandle::new(
            self.id.clone(),
            self.name.clone().or_else(|| self.local_name.clone()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting(PeripheralHandle),
    Streaming(PeripheralHandle),
    Disconnecting(PeripheralHandle),
}

impl ConnectionState {
    /// The peripheral this state refers to, if any
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        match self {
            Self::Idle | Self::Scanning => None,
            Self::Connecting(p) | Self::Streaming(p) | Self::Disconnecting(p) => Some(p),
        }
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting(_) => "connecting",
            Self::Streaming(_) => "streaming",
            Self::Disconnecting(_) => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peripheral() {
            Some(p) => write!(f, "{} {}", self.label(), p),
            None => f.write_str(self.label()),
        }
    }
}

/// Notifications pushed from the monitor to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    StateChanged(ConnectionState),
    DevicesChanged(Vec<PeripheralHandle>),
    HeartRate(Option<i32>),
    LogMessage(StatusMessage),
}

/// Requests from the UI to the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothCommand {
    RequestPermissions,
    StartScan,
    ToggleScan,
    Connect(PeripheralHandle),
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_local_name() {
        let seen = DiscoveredPeripheral {
            id: "AA:BB".to_string(),
            name: None,
            local_name: Some("HeartRate-Sense".to_string()),
        };
        let handle = seen.to_handle();
        assert_eq!(handle.display_name(), "HeartRate-Sense");
        assert_eq!(PeripheralHandle::new("CC", None).display_name(), "Unknown Device");
    }

    #[test]
    fn test_state_peripheral() {
        let handle = PeripheralHandle::new("AA:BB", None);
        assert_eq!(ConnectionState::Idle.peripheral(), None);
        assert_eq!(
            ConnectionState::Streaming(handle.clone()).peripheral(),
            Some(&handle)
        );
        assert!(ConnectionState::Scanning.is_scanning());
        assert_eq!(ConnectionState::Disconnecting(handle).label(), "disconnecting");
    }
}
