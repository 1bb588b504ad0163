use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{
    DEFAULT_APP_NAME, MUSICCAST_MANUFACTURER, MUSICCAST_MODEL_DESCRIPTION, SSDP_MULTICAST_ADDR,
    ST_MEDIA_RENDERER,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_search_target")]
    pub search_target: String,
    #[serde(default = "default_multicast_addr")]
    pub multicast_addr: SocketAddr,
    #[serde(default = "default_any_addr")]
    pub bind: SocketAddr,
    /// Interface names to search on; empty means all
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// MX value and receive window of a single search
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    #[serde(default = "default_warmup_searches")]
    pub warmup_searches: u32,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default = "default_model_description")]
    pub model_description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_any_addr")]
    pub bind: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_search_target() -> String {
    ST_MEDIA_RENDERER.to_string()
}

fn default_multicast_addr() -> SocketAddr {
    SSDP_MULTICAST_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([239, 255, 255, 250], 1900)))
}

fn default_any_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}

fn default_wait_secs() -> u64 {
    1
}

fn default_warmup_searches() -> u32 {
    5
}

fn default_interval() -> u64 {
    30
}

fn default_manufacturer() -> String {
    MUSICCAST_MANUFACTURER.to_string()
}

fn default_model_description() -> String {
    MUSICCAST_MODEL_DESCRIPTION.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_timeout() -> u64 {
    5
}

fn default_listen() -> String {
    "127.0.0.1:8054".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_target: default_search_target(),
            multicast_addr: default_multicast_addr(),
            bind: default_any_addr(),
            interfaces: Vec::new(),
            wait_secs: default_wait_secs(),
            warmup_searches: default_warmup_searches(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            manufacturer: default_manufacturer(),
            model_description: default_model_description(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ControlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            bind: default_any_addr(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.discovery.search_target.trim().is_empty() {
            bail!("discovery.search_target must not be empty");
        }
        if self.discovery.wait_secs == 0 {
            bail!("discovery.wait_secs must be >= 1");
        }
        if self.discovery.interval_secs == 0 {
            bail!("discovery.interval_secs must be >= 1");
        }
        if self.control.timeout_secs == 0 {
            bail!("control.timeout_secs must be >= 1");
        }
        if self.filter.manufacturer.is_empty() || self.filter.model_description.is_empty() {
            bail!("filter.manufacturer and filter.model_description must not be empty");
        }
        Ok(())
    }
}
