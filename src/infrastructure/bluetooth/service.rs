//! Heart-Rate Service Module
//!
//! Lifecycle state machine for the heart-rate peripheral. It is the single
//! owner of the device list, the connection state, the notification
//! subscription and the latest reading. UI commands and transport events are
//! handled strictly one at a time.

use crate::domain::errors::{MonitorError, TransportError};
use crate::domain::models::{
    AppEvent, BluetoothCommand, ConnectionState, DiscoveredPeripheral, MessageSeverity,
    PeripheralHandle, StatusMessage,
};
use crate::domain::protocol;
use crate::domain::registry::DeviceRegistry;
use crate::domain::settings::MonitorConfig;
use crate::infrastructure::bluetooth::transport::{Subscription, Transport, TransportEvent};
use crate::infrastructure::permissions::PermissionGate;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

pub struct HeartRateService<T: Transport> {
    transport: T,
    permissions: PermissionGate,
    config: MonitorConfig,
    registry: DeviceRegistry,
    state: ConnectionState,
    /// Present exactly while streaming
    subscription: Option<Subscription>,
    heart_rate: Option<i32>,
    authorized: bool,
    last_error: Option<MonitorError>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<T: Transport> HeartRateService<T> {
    /// `transport_events` must be the receiving end of the channel `transport`
    /// reports into.
    pub fn new(
        transport: T,
        permissions: PermissionGate,
        config: MonitorConfig,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            transport,
            permissions,
            config,
            registry: DeviceRegistry::new(),
            state: ConnectionState::Idle,
            subscription: None,
            heart_rate: None,
            authorized: false,
            last_error: None,
            transport_events,
            event_sender,
        }
    }

    /// Process UI commands and transport events until the command channel closes
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<BluetoothCommand>) {
        info!("Heart-rate service started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.transport_events.recv() => self.handle_event(event),
            }
        }
        self.shutdown();
        info!("Heart-rate service stopped");
    }

    pub fn handle_command(&mut self, command: BluetoothCommand) {
        debug!("Command: {:?}", command);
        match command {
            BluetoothCommand::RequestPermissions => {
                self.request_authorization();
            }
            BluetoothCommand::StartScan => self.start_scan(),
            BluetoothCommand::ToggleScan => self.toggle_scan(),
            BluetoothCommand::Connect(peripheral) => self.connect(peripheral),
            BluetoothCommand::Disconnect => self.disconnect(),
        }
    }

    pub fn request_authorization(&mut self) -> bool {
        self.authorized = self.permissions.request_authorization();
        if !self.authorized {
            self.fail(MonitorError::PermissionDenied);
        }
        self.authorized
    }

    /// Start a new scan session. Requires a prior successful authorization.
    pub fn start_scan(&mut self) {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Scanning => {
                debug!("Scan already running");
                return;
            }
            _ => {
                warn!("Cannot scan while {}", self.state);
                return;
            }
        }

        if !self.authorized {
            self.fail(MonitorError::PermissionDenied);
            return;
        }

        self.registry.reset();
        self.publish_devices();

        if let Err(e) = self.transport.start_scan() {
            self.fail(MonitorError::ScanFailure(e));
            return;
        }
        self.set_state(ConnectionState::Scanning);
    }

    /// Pause a running scan, or start one when idle
    pub fn toggle_scan(&mut self) {
        match self.state {
            ConnectionState::Scanning => {
                self.transport.stop_scan();
                self.set_state(ConnectionState::Idle);
            }
            ConnectionState::Idle => self.start_scan(),
            _ => warn!("Cannot toggle scanning while {}", self.state),
        }
    }

    pub fn connect(&mut self, peripheral: PeripheralHandle) {
        match self.state {
            ConnectionState::Idle => {}
            // Scanning and connecting compete for the radio
            ConnectionState::Scanning => self.transport.stop_scan(),
            _ => {
                warn!("Already {}; ignoring connect to {}", self.state, peripheral);
                return;
            }
        }

        self.transport.connect(&peripheral.id);
        self.set_state(ConnectionState::Connecting(peripheral));
    }

    /// Tear down the stream. A no-op unless streaming.
    pub fn disconnect(&mut self) {
        let ConnectionState::Streaming(peripheral) = &self.state else {
            debug!("Disconnect ignored while {}", self.state);
            return;
        };
        let peripheral = peripheral.clone();

        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.transport.disconnect(&peripheral.id);
        self.set_state(ConnectionState::Disconnecting(peripheral));
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Discovered(peripheral) => self.on_discovered(&peripheral),
            TransportEvent::ScanFailed(error) => self.on_scan_failed(error),
            TransportEvent::Connected { id } => self.on_connected(&id),
            TransportEvent::ConnectFailed { id, error } => self.on_connect_failed(&id, error),
            TransportEvent::ServicesDiscovered { id } => self.on_services_discovered(&id),
            TransportEvent::DiscoveryFailed { id, error } => self.on_discovery_failed(&id, error),
            TransportEvent::Notification { id, value } => self.on_notification(&id, &value),
            TransportEvent::SubscribeFailed { id, error } => self.on_subscribe_failed(&id, error),
            TransportEvent::NotificationError { id, error } => {
                self.on_notification_error(&id, error)
            }
            TransportEvent::Disconnected { id, result } => self.on_disconnected(&id, result),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn devices(&self) -> &[PeripheralHandle] {
        self.registry.all()
    }

    /// The peripheral holding the link, while streaming or tearing down
    pub fn connected_device(&self) -> Option<&PeripheralHandle> {
        match &self.state {
            ConnectionState::Streaming(p) | ConnectionState::Disconnecting(p) => Some(p),
            _ => None,
        }
    }

    pub fn heart_rate(&self) -> Option<i32> {
        self.heart_rate
    }

    pub fn is_scanning(&self) -> bool {
        self.state.is_scanning()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn last_error(&self) -> Option<&MonitorError> {
        self.last_error.as_ref()
    }

    fn on_discovered(&mut self, peripheral: &DiscoveredPeripheral) {
        if !self.state.is_scanning() {
            trace!("Late discovery of {} ignored", peripheral.id);
            return;
        }
        if self.registry.on_discovered(peripheral, &self.config.filter) {
            self.publish_devices();
        }
    }

    fn on_scan_failed(&mut self, error: TransportError) {
        if !self.state.is_scanning() {
            debug!("Scan error after scan ended: {}", error);
            return;
        }
        self.fail(MonitorError::ScanFailure(error));
        self.transport.stop_scan();
        self.set_state(ConnectionState::Idle);
    }

    fn on_connected(&mut self, id: &str) {
        if self.connecting(id).is_none() {
            debug!("Stale connect completion for {}", id);
            return;
        }
        self.transport.discover_services(id);
    }

    fn on_connect_failed(&mut self, id: &str, error: TransportError) {
        if self.connecting(id).is_none() {
            debug!("Stale connect failure for {}: {}", id, error);
            return;
        }
        self.fail(MonitorError::ConnectFailure(error));
        self.set_state(ConnectionState::Idle);
    }

    fn on_services_discovered(&mut self, id: &str) {
        let Some(peripheral) = self.connecting(id) else {
            debug!("Stale service discovery for {}", id);
            return;
        };

        match self.transport.subscribe(
            id,
            self.config.service_uuid,
            self.config.characteristic_uuid,
        ) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.set_state(ConnectionState::Streaming(peripheral));
                self.send_log("Connection established!", MessageSeverity::Success);
            }
            Err(e) => {
                self.fail(MonitorError::SubscribeFailure(e));
                // the link is up even though nothing will stream over it
                self.transport.disconnect(id);
                self.set_state(ConnectionState::Idle);
            }
        }
    }

    fn on_discovery_failed(&mut self, id: &str, error: TransportError) {
        if self.connecting(id).is_none() {
            debug!("Stale discovery failure for {}: {}", id, error);
            return;
        }
        self.fail(MonitorError::DiscoveryFailure(error));
        self.transport.disconnect(id);
        self.set_state(ConnectionState::Idle);
    }

    fn on_notification(&mut self, id: &str, value: &[u8]) {
        if self.streaming(id).is_none() {
            trace!("Notification from {} outside a stream", id);
            return;
        }

        match protocol::decode_sample(value) {
            Ok(bpm) => {
                debug!("Heart rate: {} BPM", bpm);
                self.set_heart_rate(Some(bpm));
            }
            Err(e) => warn!("Invalid heart rate data {:02X?}: {}", value, e),
        }
    }

    fn on_subscribe_failed(&mut self, id: &str, error: TransportError) {
        if self.streaming(id).is_none() {
            debug!("Stale subscribe failure for {}: {}", id, error);
            return;
        }

        // The stream task has already exited; release without cancelling
        drop(self.subscription.take());
        self.fail(MonitorError::SubscribeFailure(error));
        self.transport.disconnect(id);
        self.end_session();
    }

    fn on_notification_error(&mut self, id: &str, error: TransportError) {
        let Some(peripheral) = self.streaming(id) else {
            debug!("Notification error from {} ignored: {}", id, error);
            return;
        };

        if !error.is_disconnection() {
            error!("Data update error from {}: {}", peripheral, error);
            return;
        }

        info!("{}: {}", peripheral, MonitorError::DisconnectionDuringStream);
        // The transport already tore the stream down; release without cancelling
        drop(self.subscription.take());
        self.end_session();
    }

    fn on_disconnected(&mut self, id: &str, result: Result<(), TransportError>) {
        let Some(peripheral) = self.disconnecting(id) else {
            debug!("Stale disconnect completion for {}", id);
            return;
        };

        match result {
            Ok(()) => {
                info!("Disconnected from {}", peripheral);
                self.send_log("Disconnected from device", MessageSeverity::Info);
            }
            Err(e) => self.fail(MonitorError::DisconnectFailure(e)),
        }
        self.end_session();
    }

    fn end_session(&mut self) {
        self.subscription = None;
        self.set_heart_rate(None);
        self.set_state(ConnectionState::Idle);
    }

    fn shutdown(&mut self) {
        match self.state {
            ConnectionState::Scanning => {
                self.transport.stop_scan();
                self.set_state(ConnectionState::Idle);
            }
            ConnectionState::Streaming(_) => self.disconnect(),
            _ => {}
        }
    }

    fn connecting(&self, id: &str) -> Option<PeripheralHandle> {
        match &self.state {
            ConnectionState::Connecting(p) if p.id == id => Some(p.clone()),
            _ => None,
        }
    }

    fn streaming(&self, id: &str) -> Option<PeripheralHandle> {
        match &self.state {
            ConnectionState::Streaming(p) if p.id == id => Some(p.clone()),
            _ => None,
        }
    }

    fn disconnecting(&self, id: &str) -> Option<PeripheralHandle> {
        match &self.state {
            ConnectionState::Disconnecting(p) if p.id == id => Some(p.clone()),
            _ => None,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!("State: {} -> {}", self.state, state);
        // the device list only lives for one scan and connect session
        if state == ConnectionState::Idle && !self.registry.is_empty() {
            self.registry.reset();
            self.publish_devices();
        }
        self.state = state;
        let _ = self
            .event_sender
            .send(AppEvent::StateChanged(self.state.clone()));
    }

    fn set_heart_rate(&mut self, heart_rate: Option<i32>) {
        self.heart_rate = heart_rate;
        let _ = self.event_sender.send(AppEvent::HeartRate(heart_rate));
    }

    fn publish_devices(&self) {
        let _ = self
            .event_sender
            .send(AppEvent::DevicesChanged(self.registry.all().to_vec()));
    }

    fn fail(&mut self, error: MonitorError) {
        let severity = match error {
            // the user can grant access and retry
            MonitorError::PermissionDenied => {
                warn!("{}", error);
                MessageSeverity::Warning
            }
            _ => {
                error!("{}", error);
                MessageSeverity::Error
            }
        };
        self.send_log(&error.to_string(), severity);
        self.last_error = Some(error);
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
