//! Command intake: translates UI commands into control API calls.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{Command, CommandAction, Device, Power, VolumeDirection};
use crate::control::{ControlClient, ControlEndpoint, ControlError};
use crate::registry::RegistrySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    UnknownDevice,
    /// Device is in standby and the action is not power-on
    Suppressed,
}

/// A device in standby only accepts power-on.
fn is_allowed(device: &Device, action: CommandAction) -> bool {
    device.power == Power::On || action == CommandAction::PowerOn
}

/// Execute one command against the device as currently known.
pub async fn dispatch(
    command: &Command,
    snapshot: &RegistrySnapshot,
    control: &ControlClient,
) -> Result<DispatchOutcome, ControlError> {
    let Some(entry) = snapshot.get(&command.device_id) else {
        return Ok(DispatchOutcome::UnknownDevice);
    };
    let device = &entry.device;
    if !is_allowed(device, command.action) {
        return Ok(DispatchOutcome::Suppressed);
    }

    let endpoint = ControlEndpoint::from_device(device)?;
    match command.action {
        CommandAction::PowerOn => control.set_power(&endpoint, Power::On).await?,
        CommandAction::PowerOff => control.set_power(&endpoint, Power::Standby).await?,
        CommandAction::VolumeUp { step } => {
            control.set_volume(&endpoint, VolumeDirection::Up, step).await?
        }
        CommandAction::VolumeDown { step } => {
            control.set_volume(&endpoint, VolumeDirection::Down, step).await?
        }
        CommandAction::MuteToggle => {
            let enable = !device.mute.unwrap_or(false);
            control.set_mute(&endpoint, enable).await?
        }
    }
    Ok(DispatchOutcome::Sent)
}

/// Command loop. Failed commands are dropped, never retried.
pub async fn run_commands(
    mut rx: mpsc::Receiver<Command>,
    snapshots: watch::Receiver<Arc<RegistrySnapshot>>,
    control: ControlClient,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                let snapshot = snapshots.borrow().clone();
                match dispatch(&command, &snapshot, &control).await {
                    Ok(DispatchOutcome::Sent) => {
                        tracing::debug!("Sent {:?} to {}", command.action, command.device_id);
                    }
                    Ok(DispatchOutcome::UnknownDevice) => {
                        tracing::warn!("Dropping command for unknown device {}", command.device_id);
                    }
                    Ok(DispatchOutcome::Suppressed) => {
                        tracing::debug!(
                            "Suppressing {:?} for {}: device is in standby",
                            command.action,
                            command.device_id
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Dropping {:?} for {}: {}",
                            command.action,
                            command.device_id,
                            e
                        );
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Command dispatcher shutting down");
                break;
            }
        }
    }
    Ok(())
}
