//! BLE Connection Module
//!
//! Handles device connection, GATT discovery and the notification stream of
//! the heart-rate characteristic.

use crate::domain::errors::TransportError;
use crate::infrastructure::bluetooth::transport::{Subscription, TransportEvent};
use crate::infrastructure::bluetooth::PeripheralCache;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, ValueNotification};
use btleplug::platform::{Adapter, Peripheral};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// BLE Connection handler
pub struct BleConnection {
    adapter: Adapter,
    peripherals: PeripheralCache,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

impl BleConnection {
    pub fn new(
        adapter: Adapter,
        peripherals: PeripheralCache,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            adapter,
            peripherals,
            event_sender,
        }
    }

    /// Connect to a previously scanned peripheral
    pub fn connect(&self, id: &str) {
        info!("Connecting to Bluetooth device: {}", id);
        let peer = id.to_string();
        let sender = self.event_sender.clone();

        let started = self.spawn_for(id, move |peripheral| async move {
            let event = match peripheral.connect().await {
                Ok(()) => {
                    info!("Device connected: {}", peer);
                    TransportEvent::Connected { id: peer }
                }
                Err(e) => TransportEvent::ConnectFailed {
                    id: peer,
                    error: e.into(),
                },
            };
            let _ = sender.send(event);
        });

        if let Err((id, error)) = started {
            let _ = self
                .event_sender
                .send(TransportEvent::ConnectFailed { id, error });
        }
    }

    /// Discover GATT services and characteristics
    pub fn discover_services(&self, id: &str) {
        info!("Discovering services of {}...", id);
        let peer = id.to_string();
        let sender = self.event_sender.clone();

        let started = self.spawn_for(id, move |peripheral| async move {
            let event = match peripheral.discover_services().await {
                Ok(()) => {
                    info!(
                        "Found {} characteristics on {}",
                        peripheral.characteristics().len(),
                        peer
                    );
                    TransportEvent::ServicesDiscovered { id: peer }
                }
                Err(e) => TransportEvent::DiscoveryFailed {
                    id: peer,
                    error: e.into(),
                },
            };
            let _ = sender.send(event);
        });

        if let Err((id, error)) = started {
            let _ = self
                .event_sender
                .send(TransportEvent::DiscoveryFailed { id, error });
        }
    }

    /// Enable notifications on the given characteristic
    pub fn subscribe(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Subscription, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let peripheral = self.lookup(id)?;

        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or(TransportError::CharacteristicNotFound {
                service,
                characteristic,
            })?;

        info!("Subscribing to characteristic {:?}", target.uuid);
        let task = runtime.spawn(stream_notifications(
            self.adapter.clone(),
            peripheral.clone(),
            target.clone(),
            id.to_string(),
            self.event_sender.clone(),
        ));

        Ok(Subscription::new(move || {
            task.abort();
            runtime.spawn(async move {
                if let Err(e) = peripheral.unsubscribe(&target).await {
                    debug!("Unsubscribe failed: {}", e);
                }
            });
        }))
    }

    /// Disconnect from the peripheral
    pub fn disconnect(&self, id: &str) {
        info!("Disconnecting from peripheral {}...", id);
        let peer = id.to_string();
        let sender = self.event_sender.clone();

        let started = self.spawn_for(id, move |peripheral| async move {
            let result = peripheral.disconnect().await.map_err(TransportError::from);
            if let Err(e) = &result {
                warn!("Disconnect from {} reported: {}", peer, e);
            }
            let _ = sender.send(TransportEvent::Disconnected { id: peer, result });
        });

        if let Err((id, error)) = started {
            let _ = self.event_sender.send(TransportEvent::Disconnected {
                id,
                result: Err(error),
            });
        }
    }

    fn lookup(&self, id: &str) -> Result<Peripheral, TransportError> {
        self.peripherals
            .lock()
            .ok()
            .and_then(|cache| cache.get(id).cloned())
            .ok_or_else(|| TransportError::UnknownPeripheral(id.to_string()))
    }

    /// Run `operation` against the cached peripheral on the current runtime
    fn spawn_for<F, Fut>(&self, id: &str, operation: F) -> Result<(), (String, TransportError)>
    where
        F: FnOnce(Peripheral) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let runtime =
            Handle::try_current().map_err(|_| (id.to_string(), TransportError::NoRuntime))?;
        let peripheral = self.lookup(id).map_err(|e| (id.to_string(), e))?;
        runtime.spawn(operation(peripheral));
        Ok(())
    }
}

/// Enable notifications and forward them until the link drops
async fn stream_notifications(
    adapter: Adapter,
    peripheral: Peripheral,
    characteristic: Characteristic,
    id: String,
    sender: mpsc::UnboundedSender<TransportEvent>,
) {
    let setup = async {
        // The adapter reports a dropped link faster than the notification stream closes
        let central_events = adapter.events().await?;
        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&characteristic).await?;
        Ok::<_, TransportError>((central_events, notifications))
    };

    let (central_events, notifications) = match setup.await {
        Ok(streams) => streams,
        Err(error) => {
            error!("Enabling notifications on {} failed: {}", id, error);
            let _ = sender.send(TransportEvent::SubscribeFailed { id, error });
            return;
        }
    };

    forward_notifications(
        central_events,
        notifications,
        &peripheral,
        &characteristic,
        &id,
        &sender,
    )
    .await;
    let _ = sender.send(TransportEvent::NotificationError {
        id,
        error: TransportError::DeviceDisconnected,
    });
}

/// Returns once the link is gone or nobody listens anymore
async fn forward_notifications(
    mut central_events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    mut notifications: Pin<Box<dyn Stream<Item = ValueNotification> + Send>>,
    peripheral: &Peripheral,
    characteristic: &Characteristic,
    id: &str,
    sender: &mpsc::UnboundedSender<TransportEvent>,
) {
    let peripheral_id = peripheral.id();

    loop {
        tokio::select! {
            notification = notifications.next() => match notification {
                Some(n) if n.uuid == characteristic.uuid => {
                    trace!("Raw sample from {}: {:02X?}", id, n.value);
                    let event = TransportEvent::Notification {
                        id: id.to_string(),
                        value: n.value,
                    };
                    if sender.send(event).is_err() {
                        return;
                    }
                }
                Some(_) => {}
                None => return,
            },
            event = central_events.next() => match event {
                Some(CentralEvent::DeviceDisconnected(gone)) if gone == peripheral_id => {
                    info!("Device {} disconnected", id);
                    return;
                }
                Some(_) => {}
                None => return,
            },
        }
    }
}
