//! Configuration Module
//!
//! Provides TOML-based configuration for owmqtt with support for:
//! - owserver access (address, per-request timeout)
//! - Broker session parameters (host, QoS, retain, reconnect backoff)
//! - Scan schedule (interval, root, ignore prefixes)
//! - Environment variable overrides (OWMQTT__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::filter::IgnoreList;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests;

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// owserver access configuration
    pub owfs: OwfsConfig,
    /// Broker session configuration
    pub mqtt: MqttConfig,
    /// Scan schedule configuration
    pub scan: ScanConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// owserver access configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OwfsConfig {
    /// owserver endpoint (host:port)
    #[serde(default = "default_owfs_address")]
    pub address: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_owfs_timeout")]
    pub timeout: u64,
}

fn default_owfs_address() -> String {
    "localhost:4304".to_string()
}

fn default_owfs_timeout() -> u64 {
    5
}

impl Default for OwfsConfig {
    fn default() -> Self {
        Self {
            address: default_owfs_address(),
            timeout: default_owfs_timeout(),
        }
    }
}

impl OwfsConfig {
    /// Get the per-request timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Broker session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive: u16,
    /// Client ID presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// QoS level requested for published values (0, 1, or 2)
    #[serde(default)]
    pub qos: u8,
    /// Publish with the retain flag set
    #[serde(default = "default_true")]
    pub retain: bool,
    /// Prefix prepended to every namespace path to form the topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Reconnect interval in seconds (backoff floor)
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    /// Maximum reconnect interval in seconds (backoff cap)
    #[serde(default = "default_max_reconnect_interval")]
    pub max_reconnect_interval: u64,
    /// Connection timeout in seconds for the initial session
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Outbound request queue capacity.
    /// Publishes queue here while a scan runs; the event loop drains them.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Bounded wait in milliseconds for one event-loop service pass
    #[serde(default = "default_service_timeout_ms")]
    pub service_timeout_ms: u64,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keepalive() -> u16 {
    10
}

fn default_client_id() -> String {
    format!("owmqtt-{}", std::process::id())
}

fn default_true() -> bool {
    true
}

fn default_topic_prefix() -> String {
    "/1wire".to_string()
}

fn default_reconnect_interval() -> u64 {
    5
}

fn default_max_reconnect_interval() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_service_timeout_ms() -> u64 {
    500
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            keepalive: default_keepalive(),
            client_id: default_client_id(),
            qos: 0,
            retain: true,
            topic_prefix: default_topic_prefix(),
            reconnect_interval: default_reconnect_interval(),
            max_reconnect_interval: default_max_reconnect_interval(),
            connect_timeout: default_connect_timeout(),
            queue_capacity: default_queue_capacity(),
            service_timeout_ms: default_service_timeout_ms(),
        }
    }
}

impl MqttConfig {
    /// Get the keep-alive interval as Duration
    pub fn keepalive_duration(&self) -> Duration {
        Duration::from_secs(self.keepalive as u64)
    }

    /// Get the reconnect interval as Duration
    pub fn reconnect_interval_duration(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval)
    }

    /// Get the max reconnect interval as Duration
    pub fn max_reconnect_interval_duration(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_interval)
    }

    /// Get the connect timeout as Duration
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Get the event-loop service bound as Duration
    pub fn service_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }
}

/// Scan schedule configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Polling interval in seconds (fixed-rate)
    #[serde(default = "default_scan_interval")]
    pub interval: u64,
    /// Namespace root to walk
    #[serde(default = "default_scan_root")]
    pub root: String,
    /// Path prefixes excluded from the walk, including everything beneath them
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

fn default_scan_interval() -> u64 {
    10
}

fn default_scan_root() -> String {
    "/".to_string()
}

fn default_ignore() -> Vec<String> {
    [
        "/alarm/",
        "/bus.",
        "/settings/",
        "/simultaneous/",
        "/statistics/",
        "/structure/",
        "/system/",
        "/uncached/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: default_scan_interval(),
            root: default_scan_root(),
            ignore: default_ignore(),
        }
    }
}

impl ScanConfig {
    /// Get the polling interval as Duration
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `OWMQTT__` prefix with double underscores for nesting:
    ///    - `OWMQTT__MQTT__HOST=broker.local` overrides `mqtt.host`
    ///    - `OWMQTT__SCAN__INTERVAL=30` overrides `scan.interval`
    ///    - `OWMQTT__OWFS__ADDRESS=owhost:4304` overrides `owfs.address`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", "info")?
            .set_default("owfs.address", "localhost:4304")?
            .set_default("owfs.timeout", 5)?
            .set_default("mqtt.host", "localhost")?
            .set_default("mqtt.port", 1883)?
            .set_default("mqtt.keepalive", 10)?
            .set_default("mqtt.client_id", default_client_id())?
            .set_default("mqtt.qos", 0)?
            .set_default("mqtt.retain", true)?
            .set_default("mqtt.topic_prefix", "/1wire")?
            .set_default("mqtt.reconnect_interval", 5)?
            .set_default("mqtt.max_reconnect_interval", 60)?
            .set_default("mqtt.connect_timeout", 30)?
            .set_default("mqtt.queue_capacity", 1024)?
            .set_default("mqtt.service_timeout_ms", 500)?
            .set_default("scan.interval", 10)?
            .set_default("scan.root", "/")?
            .set_default("scan.ignore", default_ignore())?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (OWMQTT__MQTT__HOST, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("OWMQTT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.qos > 2 {
            return Err(ConfigError::Validation(
                "mqtt.qos must be 0, 1, or 2".to_string(),
            ));
        }

        if self.scan.interval == 0 {
            return Err(ConfigError::Validation(
                "scan.interval must be at least 1 second".to_string(),
            ));
        }

        if self.owfs.address.is_empty() {
            return Err(ConfigError::Validation(
                "owfs.address must not be empty".to_string(),
            ));
        }

        // The walker forms child paths by appending enumerated names to the
        // parent, so the root must itself be a container path.
        if !self.scan.root.starts_with('/') || !self.scan.root.ends_with('/') {
            return Err(ConfigError::Validation(format!(
                "scan.root '{}' must start and end with '/'",
                self.scan.root
            )));
        }

        if let Err(e) = IgnoreList::compile(&self.scan.ignore) {
            return Err(ConfigError::Validation(e.to_string()));
        }

        Ok(())
    }
}
