//! Push-event listener.
//!
//! Devices that received our event port in a control request send JSON
//! datagrams to it whenever their state changes. Each datagram becomes a
//! partial update carrying only the fields it names.

use std::net::SocketAddr;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{DeviceDelta, DeviceUpdate, Power};
use crate::control::{ControlClient, ControlEndpoint};
use crate::registry::RegistryHandle;
use crate::ssdp::TransportError;

const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("event has no device_id")]
    MissingId,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    main: Option<ZoneEvent>,
    #[serde(default)]
    netusb: Option<NetusbEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneEvent {
    power: Option<Power>,
    volume: Option<u8>,
    mute: Option<bool>,
    input: Option<String>,
}

/// Source markers we recognize but do not merge.
#[derive(Debug, Default, Deserialize)]
struct NetusbEvent {
    play_time: Option<i64>,
    play_info_updated: Option<bool>,
    list_info_updated: Option<bool>,
    account_updated: Option<bool>,
    play_error: Option<i64>,
}

impl NetusbEvent {
    fn has_markers(&self) -> bool {
        self.play_time.is_some()
            || self.play_info_updated.is_some()
            || self.list_info_updated.is_some()
            || self.account_updated.is_some()
            || self.play_error.is_some()
    }
}

/// Decode one datagram. `Ok(None)` means the event is valid but carries
/// nothing to merge.
pub fn decode_event(data: &[u8]) -> Result<Option<DeviceDelta>, EventError> {
    let envelope: EventEnvelope = serde_json::from_slice(data)?;
    if envelope.device_id.is_empty() {
        return Err(EventError::MissingId);
    }

    if let Some(netusb) = &envelope.netusb {
        if netusb.has_markers() {
            tracing::debug!(
                "Discarding netusb markers from {} (play_time {:?})",
                envelope.device_id,
                netusb.play_time
            );
        }
    }

    let mut delta = DeviceDelta::new(envelope.device_id);
    if let Some(main) = envelope.main {
        delta.power = main.power;
        delta.volume = main.volume;
        delta.mute = main.mute;
        delta.input = main.input;
    }

    if delta.is_empty() {
        return Ok(None);
    }
    Ok(Some(delta))
}

/// Events name a new input without its display text. Re-poll the status so
/// both change together; when the poll fails the input change is dropped.
async fn complete_input_change(
    mut delta: DeviceDelta,
    registry: &RegistryHandle,
    control: &ControlClient,
) -> DeviceDelta {
    let snapshot = registry.snapshot();
    let Some(entry) = snapshot.get(&delta.id) else {
        return delta;
    };

    let status = match ControlEndpoint::from_device(&entry.device) {
        Ok(endpoint) => control.get_status(&endpoint).await,
        Err(e) => Err(e),
    };
    match status {
        Ok(status) => {
            delta.input = Some(status.input);
            delta.input_text = Some(status.input_text);
        }
        Err(e) => {
            tracing::warn!("Dropping input change for {}, status poll failed: {}", delta.id, e);
            delta.input = None;
        }
    }
    delta
}

pub struct EventListener {
    socket: UdpSocket,
}

impl EventListener {
    /// Bind the event socket. Port 0 lets the OS choose.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await.map_err(TransportError::Bind)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Bind)
    }

    /// The port to advertise to devices.
    pub fn port(&self) -> u16 {
        self.local_addr().map(|addr| addr.port()).unwrap_or(0)
    }

    /// Receive loop. Malformed events are logged and skipped; a receive
    /// error or cancellation ends the loop and closes the socket. After a
    /// receive error `control` stops advertising the event port.
    pub async fn run(
        self,
        registry: RegistryHandle,
        control: ControlClient,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::info!("Listening for device events on {:?}", self.local_addr().ok());
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::error!(
                                "Event socket receive failed, no longer receiving device events: {}",
                                e
                            );
                            control.stop_event_subscription();
                            break;
                        }
                    };
                    tracing::trace!("Received {} byte event from {}", len, src);

                    match decode_event(&buf[..len]) {
                        Ok(Some(mut delta)) => {
                            if delta.input.is_some() {
                                delta = complete_input_change(delta, &registry, &control).await;
                            }
                            if !delta.is_empty() {
                                registry.apply(DeviceUpdate::Partial(delta)).await?;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                "Discarding malformed event from {}: {} (payload {:?})",
                                src,
                                e,
                                String::from_utf8_lossy(&buf[..len])
                            );
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Event listener shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
