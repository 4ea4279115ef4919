//! # Configuration Management
//!
//! Centralized configuration for the relay server and client.
//!
//! ## Configuration Sources
//! - TOML files via [`RelayConfig::from_file`]
//! - Environment variables via [`RelayConfig::from_env`]
//! - Direct instantiation with defaults
//!
//! Durations are written as milliseconds and the log level as a lowercase
//! string, so a minimal file looks like:
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:12445"
//! session_ttl = 60000
//!
//! [logging]
//! log_level = "debug"
//! ```

use crate::error::{ProtocolError, Result};
use crate::session::code::DEFAULT_CODE_LENGTH;
use crate::session::registry::DEFAULT_SHARD_COUNT;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default relay address for both ends.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:12445";

/// Top-level configuration for a relay process
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RelayConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CAPTCHA_RELAY_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("CAPTCHA_RELAY_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Some(val) = env_millis("CAPTCHA_RELAY_READ_TIMEOUT_MS")? {
            config.server.read_timeout = val;
            config.client.read_timeout = val;
        }

        if let Some(val) = env_millis("CAPTCHA_RELAY_SESSION_TTL_MS")? {
            config.server.session_ttl = val;
        }

        if let Some(val) = env_millis("CAPTCHA_RELAY_RECONNECT_DELAY_MS")? {
            config.client.reconnect_delay = val;
        }

        if let Some(val) = env_millis("CAPTCHA_RELAY_KEEPALIVE_INTERVAL_MS")? {
            config.client.keepalive_interval = val;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Read a millisecond duration from the environment. Unset is `None`,
/// unparsable is an error.
fn env_millis(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid {name}='{raw}': {e}"))),
        Err(_) => Ok(None),
    }
}

/// Servers need a socket address; clients may also name a host.
fn validate_address(label: &str, address: &str, allow_hostname: bool, errors: &mut Vec<String>) {
    let host_port = || {
        address.rsplit_once(':').is_some_and(|(host, port)| {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        })
    };

    if address.is_empty() {
        errors.push(format!("{label} address cannot be empty"));
    } else if address.parse::<std::net::SocketAddr>().is_err() && !(allow_hostname && host_port()) {
        errors.push(format!(
            "Invalid {} address format: '{}' (expected format: '127.0.0.1:12445')",
            label.to_lowercase(),
            address
        ));
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:12445")
    pub address: String,

    /// Close a connection that sends nothing for this long
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Idle lifetime of a session record
    #[serde(with = "duration_serde")]
    pub session_ttl: Duration,

    /// Period of the expiry sweep
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,

    /// Length of allocated codes
    pub code_length: usize,

    /// Number of registry lock stripes
    pub shard_count: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            read_timeout: timeout::DEFAULT_READ_TIMEOUT,
            session_ttl: timeout::SESSION_TTL,
            sweep_interval: timeout::SWEEP_INTERVAL,
            code_length: DEFAULT_CODE_LENGTH,
            shard_count: DEFAULT_SHARD_COUNT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        validate_address("Server", &self.address, false, &mut errors);

        if self.read_timeout.as_millis() < 100 {
            errors.push("Server read timeout too short (minimum: 100ms)".to_string());
        } else if self.read_timeout.as_secs() > 300 {
            errors.push("Server read timeout too long (maximum: 300s)".to_string());
        }

        if self.session_ttl.as_secs() < 1 {
            errors.push("Session TTL too short (minimum: 1s)".to_string());
        }

        if self.sweep_interval.as_millis() < 100 {
            errors.push("Sweep interval too short (minimum: 100ms)".to_string());
        }

        // Four digits leave too few codes for collision-free allocation.
        if self.code_length < 4 || self.code_length > 64 {
            errors.push(format!(
                "Invalid code length: {} (valid range: 4-64)",
                self.code_length
            ));
        }

        if self.shard_count == 0 {
            errors.push("Shard count must be greater than 0".to_string());
        } else if self.shard_count > 4096 {
            errors.push(format!(
                "Shard count too large: {} (maximum: 4096)",
                self.shard_count
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address, a socket address or `host:port`
    pub address: String,

    /// Timeout for a single connection attempt
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Drop the connection after this long without inbound traffic
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Interval between keepalive packets
    #[serde(with = "duration_serde")]
    pub keepalive_interval: Duration,

    /// Fixed delay between reconnect attempts
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            connect_timeout: timeout::CONNECT_TIMEOUT,
            read_timeout: timeout::DEFAULT_READ_TIMEOUT,
            keepalive_interval: timeout::KEEPALIVE_INTERVAL,
            reconnect_delay: timeout::RECONNECT_DELAY,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        validate_address("Client", &self.address, true, &mut errors);

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.read_timeout.as_millis() < 100 {
            errors.push("Client read timeout too short (minimum: 100ms)".to_string());
        }

        if self.keepalive_interval.as_millis() < 10 {
            errors.push("Keepalive interval too short (minimum: 10ms)".to_string());
        } else if self.keepalive_interval >= self.read_timeout {
            errors.push(format!(
                "Keepalive interval ({}ms) must be shorter than the read timeout ({}ms)",
                self.keepalive_interval.as_millis(),
                self.read_timeout.as_millis()
            ));
        }

        if self.reconnect_delay.as_millis() < 10 {
            errors.push("Reconnect delay too short (minimum: 10ms)".to_string());
        } else if self.reconnect_delay.as_secs() > 60 {
            errors.push("Reconnect delay too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("captcha-relay"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
