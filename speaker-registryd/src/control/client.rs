//! HTTP client for the MusicCast extended control API.
//!
//! Every call is a GET below the device's control URL. Replies are JSON
//! objects carrying a `response_code`; the code is decoded on its own first
//! and only a zero code goes on to the typed payload decode.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use shared::protocol::{
    DEFAULT_CONTROL_URL, HEADER_APP_NAME, HEADER_APP_PORT, PATH_GET_DEVICE_INFO,
    PATH_GET_PLAY_INFO, PATH_GET_STATUS, PATH_SET_MUTE, PATH_SET_POWER, PATH_SET_VOLUME,
};
use shared::types::{Device, Power, VolumeDirection};
use super::models::{
    response_code_meaning, DeviceInfoResponse, PlayInfoResponse, ResponseEnvelope, StatusResponse,
};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("control request returned HTTP {0}")]
    HttpStatus(u16),

    #[error("invalid control response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The device answered, but with a non-zero `response_code`.
    #[error("device returned response code {code} ({meaning})")]
    Api { code: i32, meaning: &'static str },

    #[error("invalid control endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Root URL of a device's control API, e.g. `http://192.168.1.20/YamahaExtendedControl/v1/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    root: Url,
}

impl ControlEndpoint {
    /// Resolve `control_url` against `base_url`. An empty control URL falls
    /// back to the standard path.
    pub fn new(base_url: &str, control_url: &str) -> Result<Self, ControlError> {
        let base = Url::parse(base_url)
            .map_err(|e| ControlError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        let mut path = if control_url.is_empty() {
            DEFAULT_CONTROL_URL.to_string()
        } else {
            control_url.to_string()
        };
        if !path.ends_with('/') {
            path.push('/');
        }

        let root = base
            .join(&path)
            .map_err(|e| ControlError::InvalidEndpoint(format!("{}: {}", path, e)))?;
        Ok(Self { root })
    }

    pub fn from_device(device: &Device) -> Result<Self, ControlError> {
        Self::new(&device.base_url, &device.control_url)
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ControlError> {
        let mut url = self
            .root
            .join(path)
            .map_err(|e| ControlError::InvalidEndpoint(format!("{}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

/// Decode the response code, then the typed payload.
pub fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, ControlError> {
    let envelope: ResponseEnvelope = serde_json::from_slice(body)?;
    if envelope.response_code != 0 {
        return Err(ControlError::Api {
            code: envelope.response_code,
            meaning: response_code_meaning(envelope.response_code),
        });
    }
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    app_name: String,
    /// UDP port of the event listener, shared by clones; 0 disables event subscription
    event_port: Arc<AtomicU16>,
}

impl ControlClient {
    pub fn new(http: Client, app_name: impl Into<String>, event_port: u16) -> Self {
        Self {
            http,
            app_name: app_name.into(),
            event_port: Arc::new(AtomicU16::new(event_port)),
        }
    }

    pub fn event_port(&self) -> u16 {
        self.event_port.load(Ordering::Relaxed)
    }

    /// Stop advertising the event port on this client and all its clones.
    pub fn stop_event_subscription(&self) {
        self.event_port.store(0, Ordering::Relaxed);
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &ControlEndpoint,
        path: &str,
        query: &[(&str, String)],
        subscribe: bool,
    ) -> Result<T, ControlError> {
        let url = endpoint.url(path, query)?;
        tracing::debug!("Control request: {}", url);

        let mut request = self.http.get(url);
        if subscribe {
            let event_port = self.event_port();
            if event_port > 0 {
                tracing::info!(
                    "Subscribing to events from {} on port {}",
                    endpoint.root(),
                    event_port
                );
                request = request
                    .header(HEADER_APP_NAME, self.app_name.as_str())
                    .header(HEADER_APP_PORT, event_port.to_string());
            } else {
                tracing::info!("No event port, skipping event subscription for {}", endpoint.root());
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::HttpStatus(status.as_u16()));
        }
        let body = response.bytes().await?;
        decode_response(&body)
    }

    /// Fetch the main zone status and subscribe to push events.
    pub async fn get_status(&self, endpoint: &ControlEndpoint) -> Result<StatusResponse, ControlError> {
        self.call(endpoint, PATH_GET_STATUS, &[], true).await
    }

    /// Fetch identity and model metadata and subscribe to push events.
    pub async fn get_device_info(
        &self,
        endpoint: &ControlEndpoint,
    ) -> Result<DeviceInfoResponse, ControlError> {
        self.call(endpoint, PATH_GET_DEVICE_INFO, &[], true).await
    }

    pub async fn get_play_info(&self, endpoint: &ControlEndpoint) -> Result<PlayInfoResponse, ControlError> {
        self.call(endpoint, PATH_GET_PLAY_INFO, &[], false).await
    }

    pub async fn set_power(&self, endpoint: &ControlEndpoint, power: Power) -> Result<(), ControlError> {
        let query = [("power", power.as_str().to_string())];
        self.call::<ResponseEnvelope>(endpoint, PATH_SET_POWER, &query, false)
            .await
            .map(|_| ())
    }

    /// Step the volume. `step` is sent only when greater than one; the
    /// device clamps at its own limits.
    pub async fn set_volume(
        &self,
        endpoint: &ControlEndpoint,
        direction: VolumeDirection,
        step: u8,
    ) -> Result<(), ControlError> {
        let mut query = vec![("volume", direction.as_str().to_string())];
        if step > 1 {
            query.push(("step", step.to_string()));
        }
        self.call::<ResponseEnvelope>(endpoint, PATH_SET_VOLUME, &query, false)
            .await
            .map(|_| ())
    }

    pub async fn set_mute(&self, endpoint: &ControlEndpoint, enable: bool) -> Result<(), ControlError> {
        let query = [("enable", enable.to_string())];
        self.call::<ResponseEnvelope>(endpoint, PATH_SET_MUTE, &query, false)
            .await
            .map(|_| ())
    }
}
