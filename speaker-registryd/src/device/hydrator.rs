//! Turns discovered services into full device records.
//!
//! For each service: fetch the description, apply the filter, then ask the
//! device for its status and identity. The two control calls also register
//! the event port with the device.

use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{Device, DeviceUpdate, DEFAULT_MAX_VOLUME};
use crate::control::models::{DeviceInfoResponse, StatusResponse};
use crate::control::{ControlClient, ControlEndpoint, ControlError};
use crate::registry::RegistryHandle;
use crate::ssdp::Service;
use super::descriptor::{self, DeviceDescriptor, FetchError};
use super::filter::DeviceFilter;

#[derive(Debug, Error)]
pub enum HydrateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Control(#[from] ControlError),
}

pub struct Hydrator {
    http: Client,
    control: ControlClient,
    filter: DeviceFilter,
}

impl Hydrator {
    pub fn new(http: Client, control: ControlClient, filter: DeviceFilter) -> Self {
        Self {
            http,
            control,
            filter,
        }
    }

    /// Build the full record for `service`. `Ok(None)` when the device is not
    /// one of ours.
    pub async fn hydrate(&self, service: &Service) -> Result<Option<Device>, HydrateError> {
        let descriptor = descriptor::fetch(&self.http, service).await?;
        if !self.filter.matches(Some(&descriptor)) {
            tracing::debug!(
                "Ignoring {} ({} / {})",
                service.usn,
                descriptor.manufacturer,
                descriptor.model_name
            );
            return Ok(None);
        }

        let endpoint = ControlEndpoint::new(&descriptor.url_base, &descriptor.control_url)?;
        let status = self.control.get_status(&endpoint).await?;
        let info = self.control.get_device_info(&endpoint).await?;
        Ok(Some(build_device(&descriptor, &status, &info)))
    }
}

/// Assemble a full record. The identity is the `device_id` push events carry,
/// falling back to the descriptor UDN.
pub fn build_device(
    descriptor: &DeviceDescriptor,
    status: &StatusResponse,
    info: &DeviceInfoResponse,
) -> Device {
    let id = if info.device_id.is_empty() {
        descriptor.udn.clone()
    } else {
        info.device_id.clone()
    };

    let mut device = Device {
        id,
        power: status.power,
        base_url: descriptor.url_base.clone(),
        control_url: descriptor.control_url.clone(),
        friendly_name: descriptor.friendly_name.clone(),
        device_type: descriptor.model_name.clone(),
        volume: status.volume,
        max_volume: status.max_volume.unwrap_or(DEFAULT_MAX_VOLUME),
        input: status.input.clone(),
        input_text: status.input_text.clone(),
        mute: status.mute,
    };
    device.normalize();
    device
}

/// Consume discovered services until the channel closes or `cancel` fires.
pub async fn run_hydrator(
    hydrator: Hydrator,
    mut rx: mpsc::Receiver<Service>,
    registry: RegistryHandle,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!(
        "Hydrator started (event port {})",
        hydrator.control.event_port()
    );

    loop {
        tokio::select! {
            service = rx.recv() => {
                let Some(service) = service else {
                    tracing::info!("Service channel closed, hydrator stopping");
                    break;
                };
                tracing::debug!(
                    "Candidate {} at {} (server {:?}, max-age {})",
                    service.usn,
                    service.location,
                    service.server,
                    service.max_age()
                );
                match hydrator.hydrate(&service).await {
                    Ok(Some(device)) => {
                        registry.apply(DeviceUpdate::Full(device)).await?;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Dropping candidate {}: {}", service.location, e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Hydrator shutting down");
                break;
            }
        }
    }

    Ok(())
}
