use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Maximum volume assumed when a device does not report one.
pub const DEFAULT_MAX_VOLUME: u8 = 100;

/// Power state as reported by the control API and push events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    Standby,
    On,
}

impl Power {
    /// Query value for `setPower`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Power::Standby => "standby",
            Power::On => "on",
        }
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a relative volume step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeDirection {
    Up,
    Down,
}

impl VolumeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeDirection::Up => "up",
            VolumeDirection::Down => "down",
        }
    }
}

/// A speaker as held in the registry.
/// This is the canonical data model shared by the engine, the API and its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable vendor identity, the registry key
    pub id: String,

    pub power: Power,

    /// Base URL from the device descriptor, e.g. "http://192.168.1.20:80/"
    pub base_url: String,

    /// Control API path below `base_url`, e.g. "/YamahaExtendedControl/v1/"
    pub control_url: String,

    pub friendly_name: String,

    /// Model label, e.g. "WX-021"
    pub device_type: String,

    /// Current volume; `None` means unknown, `Some(0)` is silent
    pub volume: Option<u8>,

    /// Upper bound of `volume`, always > 0
    pub max_volume: u8,

    /// Active input identifier, e.g. "net_radio"
    pub input: String,

    /// Display text for the active input, e.g. "Net Radio"
    pub input_text: String,

    /// Mute flag; `None` means unknown
    pub mute: Option<bool>,
}

impl Device {
    /// Restores the volume invariants: `max_volume > 0` and `volume <= max_volume`.
    pub fn normalize(&mut self) {
        if self.max_volume == 0 {
            self.max_volume = DEFAULT_MAX_VOLUME;
        }
        if let Some(volume) = self.volume {
            if volume > self.max_volume {
                tracing::debug!(
                    "Clamping volume {} of {} to max {}",
                    volume,
                    self.id,
                    self.max_volume
                );
                self.volume = Some(self.max_volume);
            }
        }
    }

    /// Overwrite every field present on the delta. Absent fields are left alone,
    /// and identity, names and model metadata are never touched. A new input
    /// without its display text clears the old text.
    pub fn apply_delta(&mut self, delta: &DeviceDelta) {
        if let Some(power) = delta.power {
            self.power = power;
        }
        if let Some(volume) = delta.volume {
            self.volume = Some(volume);
        }
        if let Some(mute) = delta.mute {
            self.mute = Some(mute);
        }
        if let Some(input) = &delta.input {
            if *input != self.input && delta.input_text.is_none() {
                self.input_text.clear();
            }
            self.input = input.clone();
        }
        if let Some(input_text) = &delta.input_text {
            self.input_text = input_text.clone();
        }
        self.normalize();
    }
}

/// Changed fields of a device, as decoded from a push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDelta {
    pub id: String,
    pub power: Option<Power>,
    pub volume: Option<u8>,
    pub mute: Option<bool>,
    pub input: Option<String>,
    pub input_text: Option<String>,
}

impl DeviceDelta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// True when no mergeable field is set.
    pub fn is_empty(&self) -> bool {
        self.power.is_none()
            && self.volume.is_none()
            && self.mute.is_none()
            && self.input.is_none()
            && self.input_text.is_none()
    }
}

/// An update record in transit to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceUpdate {
    /// Complete snapshot from discovery and poll; replaces the stored entry
    Full(Device),
    /// Delta from the event listener; merged field by field
    Partial(DeviceDelta),
}

impl DeviceUpdate {
    pub fn id(&self) -> &str {
        match self {
            DeviceUpdate::Full(device) => &device.id,
            DeviceUpdate::Partial(delta) => &delta.id,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, DeviceUpdate::Partial(_))
    }
}

/// A registry entry: the device plus bookkeeping owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub device: Device,

    /// First time a full record for this identity was stored
    pub first_seen: DateTime<Utc>,

    /// Last time any update for this identity was applied
    pub last_seen: DateTime<Utc>,
}

/// Actions a UI may request for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandAction {
    PowerOn,
    PowerOff,
    VolumeUp {
        #[serde(default = "default_step")]
        step: u8,
    },
    VolumeDown {
        #[serde(default = "default_step")]
        step: u8,
    },
    MuteToggle,
}

fn default_step() -> u8 {
    1
}

/// A command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub device_id: String,
    pub action: CommandAction,
}
