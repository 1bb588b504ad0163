use serde::{Deserialize, Serialize};
use shared::types::Power;

/// The part every control API response shares.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResponseEnvelope {
    pub response_code: i32,
}

/// Response from `main/getStatus`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub power: Power,
    #[serde(default)]
    pub sleep: u32,
    #[serde(default)]
    pub volume: Option<u8>,
    #[serde(default)]
    pub mute: Option<bool>,
    #[serde(default)]
    pub max_volume: Option<u8>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub input_text: String,
}

/// Response from `system/getDeviceInfo`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceInfoResponse {
    pub model_name: String,
    pub destination: String,
    pub device_id: String,
    pub system_id: String,
    pub system_version: f64,
    pub api_version: f64,
    pub netmodule_version: String,
    pub serial_number: String,
    pub operation_mode: String,
}

/// Response from `netusb/getPlayInfo`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayInfoResponse {
    pub input: String,
    pub playback: String,
    pub repeat: String,
    pub shuffle: String,
    /// Seconds into the current track
    pub play_time: i64,
    pub total_time: i64,
    pub artist: String,
    pub album: String,
    pub track: String,
    pub albumart_url: String,
}

/// Meaning of a non-zero `response_code`.
pub fn response_code_meaning(code: i32) -> &'static str {
    match code {
        0 => "successful request",
        1 => "initializing",
        2 => "internal error",
        3 => "invalid request",
        4 => "invalid parameter",
        5 => "guarded",
        6 => "time out",
        99 => "firmware updating",
        100..=111 => "access error",
        _ => "unknown",
    }
}
