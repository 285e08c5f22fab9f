//! # Configuration Management
//!
//! Settings for frame writing, rollback reading, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ```toml
//! [transport]
//! write_deadline = true
//! write_timeout = 30000   # milliseconds
//! rollback_window = 1024
//!
//! [logging]
//! app_name = "wsbt"
//! log_level = "info"
//! json_format = false
//! ```

use crate::core::packet::DEFAULT_WRITE_TIMEOUT;
use crate::error::{ProtocolError, Result};
use crate::stream::DEFAULT_ROLLBACK_WINDOW;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Largest rollback window accepted by validation
const MAX_ROLLBACK_WINDOW: usize = 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WireConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WireConfig {
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

    /// Defaults overridden by `WSBT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(flag) = std::env::var("WSBT_WRITE_DEADLINE") {
            config.transport.write_deadline = parse_flag(&flag).ok_or_else(|| {
                ProtocolError::ConfigError(format!("Invalid WSBT_WRITE_DEADLINE: {flag}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("WSBT_WRITE_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid WSBT_WRITE_TIMEOUT_MS: {e}"))
            })?;
            config.transport.write_timeout = Duration::from_millis(millis);
        }

        if let Ok(window) = std::env::var("WSBT_ROLLBACK_WINDOW") {
            config.transport.rollback_window = window.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid WSBT_ROLLBACK_WINDOW: {e}"))
            })?;
        }

        if let Ok(level) = std::env::var("WSBT_LOG_LEVEL") {
            config.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid WSBT_LOG_LEVEL: {level}")))?;
        }

        Ok(config)
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.transport.validate();
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

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Frame writing and stream reading settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Apply `write_timeout` to streams that support write deadlines
    pub write_deadline: bool,

    /// Bound for a single frame write
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Bytes a rollback reader retains for replay
    pub rollback_window: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            write_deadline: false,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            rollback_window: DEFAULT_ROLLBACK_WINDOW,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.write_timeout.is_zero() {
            errors.push("Write timeout cannot be 0".to_string());
        } else if self.write_timeout.as_secs() > 300 {
            errors.push("Write timeout too long (maximum: 300s)".to_string());
        }

        if self.rollback_window == 0 {
            errors.push("Rollback window must be greater than 0".to_string());
        } else if self.rollback_window > MAX_ROLLBACK_WINDOW {
            errors.push(format!(
                "Rollback window too large: {} bytes (maximum: {MAX_ROLLBACK_WINDOW})",
                self.rollback_window
            ));
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
            app_name: String::from("wsbt"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
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
        level.as_str().to_ascii_lowercase().serialize(serializer)
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
