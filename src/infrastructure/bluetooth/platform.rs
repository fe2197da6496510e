//! btleplug-backed transport

use crate::domain::errors::TransportError;
use crate::infrastructure::bluetooth::connection::BleConnection;
use crate::infrastructure::bluetooth::scanner::BleScanner;
use crate::infrastructure::bluetooth::transport::{Subscription, Transport, TransportEvent};
use crate::infrastructure::bluetooth::PeripheralCache;
use anyhow::Result;
use btleplug::api::{Central, Manager as _};
use btleplug::platform::{Adapter, Manager};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

pub struct PlatformTransport {
    scanner: BleScanner,
    connection: BleConnection,
}

impl PlatformTransport {
    pub fn new(adapter: Adapter, event_sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let peripherals = PeripheralCache::default();
        Self {
            scanner: BleScanner::new(adapter.clone(), peripherals.clone(), event_sender.clone()),
            connection: BleConnection::new(adapter, peripherals, event_sender),
        }
    }

    /// Build a transport on the first adapter the platform reports
    pub async fn first_adapter(
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No Bluetooth adapter found"))?;

        info!(
            "Using adapter {}",
            adapter
                .adapter_info()
                .await
                .unwrap_or_else(|_| "No name adapter".to_string())
        );

        Ok(Self::new(adapter, event_sender))
    }
}

impl Transport for PlatformTransport {
    fn start_scan(&mut self) -> Result<(), TransportError> {
        self.scanner.start()
    }

    fn stop_scan(&mut self) {
        self.scanner.stop()
    }

    fn connect(&mut self, id: &str) {
        self.connection.connect(id)
    }

    fn discover_services(&mut self, id: &str) {
        self.connection.discover_services(id)
    }

    fn subscribe(
        &mut self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Subscription, TransportError> {
        self.connection.subscribe(id, service, characteristic)
    }

    fn disconnect(&mut self, id: &str) {
        self.connection.disconnect(id)
    }
}
