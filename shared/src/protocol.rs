/// Standard SSDP multicast group and port
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// SSDP search target for media renderers
pub const ST_MEDIA_RENDERER: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Descriptor values identifying a MusicCast speaker
pub const MUSICCAST_MANUFACTURER: &str = "Yamaha Corporation";
pub const MUSICCAST_MODEL_DESCRIPTION: &str = "MusicCast";

/// Control API paths, relative to the device control URL
pub const PATH_GET_STATUS: &str = "main/getStatus";
pub const PATH_SET_POWER: &str = "main/setPower";
pub const PATH_SET_VOLUME: &str = "main/setVolume";
pub const PATH_SET_MUTE: &str = "main/setMute";
pub const PATH_GET_DEVICE_INFO: &str = "system/getDeviceInfo";
pub const PATH_GET_PLAY_INFO: &str = "netusb/getPlayInfo";

/// Control URL used when a descriptor does not name one
pub const DEFAULT_CONTROL_URL: &str = "/YamahaExtendedControl/v1/";

/// Headers subscribing the requester to push events
pub const HEADER_APP_NAME: &str = "X-AppName";
pub const HEADER_APP_PORT: &str = "X-AppPort";

/// Default value for the X-AppName header
pub const DEFAULT_APP_NAME: &str = "MusicCast/registryd";
