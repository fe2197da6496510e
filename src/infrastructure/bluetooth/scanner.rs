//! BLE Scanner Module
//!
//! Runs an unfiltered btleplug scan and reports every named sighting. Name
//! filtering happens in the device registry.

use crate::domain::errors::TransportError;
use crate::domain::models::DiscoveredPeripheral;
use crate::infrastructure::bluetooth::transport::TransportEvent;
use crate::infrastructure::bluetooth::PeripheralCache;
use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use futures::StreamExt;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// BLE Scanner for discovering heart-rate peripherals
pub struct BleScanner {
    adapter: Adapter,
    peripherals: PeripheralCache,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    task: Option<JoinHandle<()>>,
    /// Adapter stop still in flight from the previous session
    stopping: Option<JoinHandle<()>>,
}

impl BleScanner {
    pub fn new(
        adapter: Adapter,
        peripherals: PeripheralCache,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            adapter,
            peripherals,
            event_sender,
            task: None,
            stopping: None,
        }
    }

    /// Start scanning for BLE devices
    ///
    /// Returns once the scan task is spawned; adapter failures arrive later as
    /// `ScanFailed`.
    pub fn start(&mut self) -> Result<(), TransportError> {
        // Stop any existing scan
        self.stop();

        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        info!("Starting BLE scan");

        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let sender = self.event_sender.clone();
        let pending_stop = self.stopping.take();

        // a late stop_scan would otherwise end this session
        self.task = Some(runtime.spawn(after_stop(pending_stop, async move {
            if let Err(e) = scan_loop(&adapter, &peripherals, &sender).await {
                error!("BLE scan failed: {}", e);
                let _ = sender.send(TransportEvent::ScanFailed(e));
            }
        })));

        Ok(())
    }

    /// Stop scanning
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            info!("Stopping BLE scan...");
            task.abort();

            let Ok(runtime) = Handle::try_current() else {
                return;
            };
            let adapter = self.adapter.clone();
            self.stopping = Some(runtime.spawn(async move {
                if let Err(e) = adapter.stop_scan().await {
                    warn!("Failed to stop adapter scan: {}", e);
                }
            }));
        }
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run `next` once the previous session's adapter stop has finished
async fn after_stop<F: Future>(pending_stop: Option<JoinHandle<()>>, next: F) -> F::Output {
    if let Some(stop) = pending_stop {
        let _ = stop.await;
    }
    next.await
}

async fn scan_loop(
    adapter: &Adapter,
    peripherals: &PeripheralCache,
    sender: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<(), TransportError> {
    // Subscribe before starting so no early discovery is missed
    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;

    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                debug!("Discovered peripheral vanished: {}", e);
                continue;
            }
        };
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        let Some(local_name) = properties.local_name else {
            continue;
        };

        let address = peripheral.address().to_string();
        trace!("Advertisement from {} ({})", local_name, address);

        if let Ok(mut cache) = peripherals.lock() {
            cache.insert(address.clone(), peripheral);
        }

        let seen = DiscoveredPeripheral {
            id: address,
            name: None,
            local_name: Some(local_name),
        };
        if sender.send(TransportEvent::Discovered(seen)).is_err() {
            // monitor is gone
            return Ok(());
        }
    }

    Err(TransportError::Other(
        "adapter event stream closed".to_string(),
    ))
}
