//! Agent configuration.
//!
//! Read from TOML (`$SENTINEL_CONFIG`, else the platform default path
//! below), then overridden field by field from `SENTINEL_*` environment
//! variables:
//! - Linux: `~/.config/sentinel/agent.toml`
//! - Windows: `%APPDATA%/sentinel/agent.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use serde::{Deserialize, Serialize};

use sentinel_agent::LoopConfig;
use sentinel_delivery::DeliveryConfig;
use sentinel_protocol::constants::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SCAN_TARGET, DEFAULT_SCAN_TIMEOUT, DEFAULT_TICK_INTERVAL,
};

const CONFIG_PATH_ENV: &str = "SENTINEL_CONFIG";

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path handed to the scan provider.
    #[serde(default = "default_scan_target")]
    pub scan_target: String,

    /// Seconds between tick starts.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,

    /// Records held while the collector is unreachable.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Collector WebSocket URL. Required.
    #[serde(default)]
    pub collector_endpoint: String,

    /// Bearer token presented during the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector_token: Option<String>,

    /// Identifies this agent in every record (hostname by default).
    #[serde(default = "default_source_id")]
    pub source_id: String,

    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_seconds: u64,
}

fn default_scan_target() -> String {
    DEFAULT_SCAN_TARGET.into()
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL.as_secs()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_source_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "sentinel-agent".into())
}

fn default_scan_timeout() -> u64 {
    DEFAULT_SCAN_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_target: default_scan_target(),
            tick_interval_seconds: default_tick_interval(),
            queue_capacity: default_queue_capacity(),
            collector_endpoint: String::new(),
            collector_token: None,
            source_id: default_source_id(),
            scan_timeout_seconds: default_scan_timeout(),
        }
    }
}

impl Config {
    /// Loads the file, applies environment overrides and validates.
    ///
    /// A missing file at the default path is fine (everything can come from
    /// the environment); a missing file named by `$SENTINEL_CONFIG` is not.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                let path = config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Config::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration file read");
        Ok(config)
    }

    /// Applies `SENTINEL_*` overrides. `lookup` returns a variable's value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("SENTINEL_SCAN_TARGET") {
            self.scan_target = v;
        }
        if let Some(v) = lookup("SENTINEL_TICK_INTERVAL_SECONDS") {
            self.tick_interval_seconds = parse_env("SENTINEL_TICK_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_QUEUE_CAPACITY") {
            self.queue_capacity = parse_env("SENTINEL_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_COLLECTOR_ENDPOINT") {
            self.collector_endpoint = v;
        }
        if let Some(v) = lookup("SENTINEL_COLLECTOR_TOKEN") {
            self.collector_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("SENTINEL_SOURCE_ID") {
            self.source_id = v;
        }
        if let Some(v) = lookup("SENTINEL_SCAN_TIMEOUT_SECONDS") {
            self.scan_timeout_seconds = parse_env("SENTINEL_SCAN_TIMEOUT_SECONDS", &v)?;
        }
        Ok(())
    }

    /// Rejects configurations the agent cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collector_endpoint.trim().is_empty() {
            bail!("collector_endpoint is required (set it in the config file or SENTINEL_COLLECTOR_ENDPOINT)");
        }
        ensure!(
            self.collector_endpoint.starts_with("ws://"),
            "collector_endpoint must be a ws:// URL, got {:?}",
            self.collector_endpoint
        );
        ensure!(self.tick_interval_seconds > 0, "tick_interval_seconds must be > 0");
        ensure!(self.scan_timeout_seconds > 0, "scan_timeout_seconds must be > 0");
        ensure!(self.queue_capacity > 0, "queue_capacity must be > 0");
        ensure!(!self.scan_target.trim().is_empty(), "scan_target must not be empty");
        ensure!(!self.source_id.trim().is_empty(), "source_id must not be empty");
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            scan_target: self.scan_target.clone(),
            tick_interval: self.tick_interval(),
            scan_timeout: self.scan_timeout(),
            max_ticks: None,
        }
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            queue_capacity: self.queue_capacity,
            ..DeliveryConfig::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer, got {value:?}"))
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("sentinel")
            .join("agent.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("sentinel").join("agent.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/sentinel/agent.toml")
    }
}
