use heartrate_sense::domain::models::{
    AppEvent, BluetoothCommand, ConnectionState, MessageSeverity,
};
use heartrate_sense::domain::settings::SettingsService;
use heartrate_sense::infrastructure::bluetooth::{HeartRateService, PlatformTransport};
use heartrate_sense::infrastructure::logging;
use heartrate_sense::infrastructure::permissions::{HostPermissions, PermissionGate, Platform};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What an interrupted session still has to do before exiting
#[derive(Debug, PartialEq, Eq)]
enum Shutdown {
    Exit,
    Disconnect,
    /// A link is being set up or torn down; wait for it to settle
    Wait,
}

fn shutdown_step(state: &ConnectionState) -> Shutdown {
    match state {
        ConnectionState::Idle | ConnectionState::Scanning => Shutdown::Exit,
        ConnectionState::Streaming(_) => Shutdown::Disconnect,
        ConnectionState::Connecting(_) | ConnectionState::Disconnecting(_) => Shutdown::Wait,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();

    let _logging_guard = logging::init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting HeartRate-Sense monitor");
    info!("Settings loaded from {}", settings_service.path().display());

    let config = settings.monitor_config()?;
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let transport = PlatformTransport::first_adapter(transport_tx).await?;
    let permissions = PermissionGate::new(Platform::current(), HostPermissions);
    let mut service =
        HeartRateService::new(transport, permissions, config, transport_rx, event_tx);
    let service_task = tokio::spawn(async move { service.run(command_rx).await });

    command_tx.send(BluetoothCommand::RequestPermissions)?;
    command_tx.send(BluetoothCommand::StartScan)?;

    let mut state = ConnectionState::Idle;
    let mut shutting_down = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let shutdown_deadline = tokio::time::sleep(SHUTDOWN_TIMEOUT);
    tokio::pin!(shutdown_deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !shutting_down => {
                info!("Interrupted, shutting down");
                shutting_down = true;
                match shutdown_step(&state) {
                    Shutdown::Exit => break,
                    Shutdown::Disconnect => command_tx.send(BluetoothCommand::Disconnect)?,
                    Shutdown::Wait => info!("Waiting for {} to settle", state),
                }
                shutdown_deadline
                    .as_mut()
                    .reset(tokio::time::Instant::now() + SHUTDOWN_TIMEOUT);
            }
            () = &mut shutdown_deadline, if shutting_down => {
                warn!("Disconnect did not complete in time");
                break;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::StateChanged(next) => {
                        println!("[{}]", next);
                        state = next;
                        if shutting_down {
                            match shutdown_step(&state) {
                                Shutdown::Exit => break,
                                // a connect that finished after the interrupt
                                Shutdown::Disconnect => {
                                    command_tx.send(BluetoothCommand::Disconnect)?
                                }
                                Shutdown::Wait => {}
                            }
                        }
                    }
                    AppEvent::DevicesChanged(devices) => {
                        for device in &devices {
                            println!("  found {}", device);
                        }
                        let auto_connect =
                            settings.auto_connect && !shutting_down && state.is_scanning();
                        if let Some(device) = devices.first().filter(|_| auto_connect) {
                            command_tx.send(BluetoothCommand::Connect(device.clone()))?;
                        }
                    }
                    AppEvent::HeartRate(Some(bpm)) => println!("{} BPM", bpm),
                    AppEvent::HeartRate(None) => println!("-- BPM"),
                    AppEvent::LogMessage(status) => match status.severity {
                        MessageSeverity::Error => error!("{}", status.message),
                        MessageSeverity::Warning => warn!("{}", status.message),
                        _ => println!("{}", status.message),
                    },
                }
            }
        }
    }

    drop(command_tx);
    if let Err(e) = service_task.await {
        error!("Heart-rate service task failed: {}", e);
    }
    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartrate_sense::domain::models::PeripheralHandle;

    #[test]
    fn test_shutdown_waits_for_pending_connect() {
        let peripheral = PeripheralHandle::new("AA:BB", None);
        assert_eq!(
            shutdown_step(&ConnectionState::Connecting(peripheral.clone())),
            Shutdown::Wait
        );
        // once it streams, it is torn down before exiting
        assert_eq!(
            shutdown_step(&ConnectionState::Streaming(peripheral.clone())),
            Shutdown::Disconnect
        );
        assert_eq!(
            shutdown_step(&ConnectionState::Disconnecting(peripheral)),
            Shutdown::Wait
        );
    }

    #[test]
    fn test_shutdown_exits_without_a_link() {
        assert_eq!(shutdown_step(&ConnectionState::Idle), Shutdown::Exit);
        assert_eq!(shutdown_step(&ConnectionState::Scanning), Shutdown::Exit);
    }
}
