//! Bluetooth Module
//!
//! Drives the HeartRate-Sense peripheral through its lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   HeartRateService                       │
//! │  (Lifecycle state machine - public API for the UI)       │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ Transport trait / TransportEvent channel
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  PlatformTransport                       │
//! └──────────┬──────────────────────────────┬───────────────┘
//!            ▼                              ▼
//! ┌──────────────────┐            ┌───────────────────┐
//! │     Scanner      │            │    Connection     │
//! │ - BLE discovery  │            │ - Connect / GATT  │
//! │                  │            │ - Notifications   │
//! └──────────────────┘            └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Transport trait, events and subscription handle
//! - [`scanner`] - BLE device discovery
//! - [`connection`] - Device connection, GATT discovery and notifications
//! - [`platform`] - btleplug-backed transport
//! - [`service`] - Lifecycle state machine

pub mod connection;
pub mod platform;
pub mod scanner;
pub mod service;
pub mod transport;

use crate::domain::errors::TransportError;
use btleplug::platform::Peripheral;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// Re-export main service for convenience
pub use platform::PlatformTransport;
pub use service::HeartRateService;
pub use transport::{Subscription, Transport, TransportEvent};

/// Peripherals seen by the scanner, keyed by address
pub type PeripheralCache = Arc<Mutex<HashMap<String, Peripheral>>>;

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::NotConnected => TransportError::DeviceDisconnected,
            btleplug::Error::PermissionDenied => TransportError::PermissionDenied,
            btleplug::Error::TimedOut(_) => TransportError::TimedOut,
            other => TransportError::Other(other.to_string()),
        }
    }
}
