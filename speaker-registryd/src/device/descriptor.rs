//! UPnP device description fetch and parsing.
//!
//! Besides the standard `<device>` block, MusicCast descriptors carry a
//! vendor `<yamaha:X_device>` block naming the base URL and the extended
//! control API path. Firmware nests the control path inside its service
//! list, so vendor fields are taken at any depth below `X_device`.
//! Namespace prefixes are ignored when matching.

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Url};
use thiserror::Error;
use crate::ssdp::Service;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("descriptor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("descriptor request returned HTTP {0}")]
    HttpStatus(u16),

    #[error("invalid descriptor XML: {0}")]
    Xml(String),

    #[error("descriptor has no device element")]
    MissingDevice,
}

/// Identity and control endpoint fields of a device description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub udn: String,
    pub friendly_name: String,
    pub model_name: String,
    pub manufacturer: String,
    pub model_description: String,
    /// `X_URLBase` from the vendor block
    pub url_base: String,
    /// `X_yxcControlURL` from the vendor block; empty when the block is absent
    pub control_url: String,
}

impl DeviceDescriptor {
    pub fn has_vendor_extension(&self) -> bool {
        !self.control_url.is_empty()
    }
}

/// GET `service.location` and parse the description. Failures are not retried here.
pub async fn fetch(client: &Client, service: &Service) -> Result<DeviceDescriptor, FetchError> {
    tracing::debug!("Fetching descriptor for {} from {}", service.usn, service.location);

    let response = client.get(&service.location).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    let body = response.text().await?;

    let mut descriptor = parse_descriptor(&body)?;
    if descriptor.url_base.is_empty() {
        if let Some(origin) = origin_of(&service.location) {
            tracing::debug!("Descriptor for {} has no X_URLBase, using {}", service.usn, origin);
            descriptor.url_base = origin;
        }
    }
    Ok(descriptor)
}

fn origin_of(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    })
}

/// Parse a device description document.
pub fn parse_descriptor(xml: &str) -> Result<DeviceDescriptor, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut descriptor = DeviceDescriptor::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut saw_device = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                path.push(name);
                text.clear();
            }
            Ok(Event::End(_)) => {
                match path.as_slice() {
                    [root, block, field] if root == "root" && block == "device" => {
                        assign_device_field(&mut descriptor, field, text.trim());
                    }
                    [root, block, .., field]
                        if root == "root" && block.eq_ignore_ascii_case("X_device") =>
                    {
                        assign_vendor_field(&mut descriptor, field, text.trim());
                    }
                    _ => {}
                }
                if let [root, block] = path.as_slice() {
                    if root == "root" && block == "device" {
                        saw_device = true;
                    }
                }
                path.pop();
                text.clear();
            }
            Ok(Event::Text(e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|e| FetchError::Xml(e.to_string()))?;
                text.push_str(&chunk);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Xml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !saw_device {
        return Err(FetchError::MissingDevice);
    }
    Ok(descriptor)
}

fn assign_device_field(descriptor: &mut DeviceDescriptor, field: &str, value: &str) {
    let slot = match field {
        "UDN" => &mut descriptor.udn,
        "friendlyName" => &mut descriptor.friendly_name,
        "modelName" => &mut descriptor.model_name,
        "manufacturer" => &mut descriptor.manufacturer,
        "modelDescription" => &mut descriptor.model_description,
        _ => return,
    };
    *slot = value.to_string();
}

fn assign_vendor_field(descriptor: &mut DeviceDescriptor, field: &str, value: &str) {
    if field.eq_ignore_ascii_case("X_URLBase") {
        descriptor.url_base = value.to_string();
    } else if field.eq_ignore_ascii_case("X_yxcControlURL") {
        descriptor.control_url = value.to_string();
    }
}
