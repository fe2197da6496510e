use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a BLE transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The link to the peripheral is gone
    #[error("device disconnected")]
    DeviceDisconnected,
    #[error("peripheral {0} is not known to the adapter")]
    UnknownPeripheral(String),
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("permission denied by the platform")]
    PermissionDenied,
    #[error("operation timed out")]
    TimedOut,
    #[error("no async runtime available")]
    NoRuntime,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Disconnection-class errors are expected while streaming and treated
    /// as a completed disconnect rather than a failure.
    pub fn is_disconnection(&self) -> bool {
        matches!(self, Self::DeviceDisconnected)
    }
}

/// Errors resolved at the monitor boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("bluetooth permissions were not granted")]
    PermissionDenied,
    #[error("scan failed: {0}")]
    ScanFailure(TransportError),
    #[error("connection failed: {0}")]
    ConnectFailure(TransportError),
    #[error("service discovery failed: {0}")]
    DiscoveryFailure(TransportError),
    #[error("subscribing to heart-rate notifications failed: {0}")]
    SubscribeFailure(TransportError),
    #[error("peripheral disconnected while streaming")]
    DisconnectionDuringStream,
    #[error("disconnect failed: {0}")]
    DisconnectFailure(TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnection_class() {
        assert!(TransportError::DeviceDisconnected.is_disconnection());
        assert!(!TransportError::TimedOut.is_disconnection());
        assert!(!TransportError::Other("boom".into()).is_disconnection());
    }

    #[test]
    fn test_error_messages() {
        let err = MonitorError::ConnectFailure(TransportError::UnknownPeripheral("AA".into()));
        assert_eq!(
            err.to_string(),
            "connection failed: peripheral AA is not known to the adapter"
        );
    }
}
