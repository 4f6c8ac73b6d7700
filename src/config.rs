//! # Configuration Management
//!
//! Centralized configuration for the codec and its logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Security Considerations
//! - The depth ceiling bounds recursion on adversarial input
//! - Collection and payload ceilings are checked before any allocation
//!   proportional to a declared size

use crate::error::{PackStreamError, Result};
use crate::core::marker::MAX_SIZED_LEN;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::Level;

/// Default nesting ceiling for encode and decode.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Hard upper bound for the nesting ceiling.
///
/// Decoding and encoding recurse once per level, so this also bounds stack
/// use; it fits within a 2 MiB thread stack in unoptimized builds. Larger
/// configured depths are clamped to it.
pub const MAX_DEPTH_CEILING: usize = 512;

/// Default ceiling on elements, pairs or fields in one collection.
pub const DEFAULT_MAX_COLLECTION_LEN: usize = 1024 * 1024;

/// Default ceiling on a single Bytes or Text payload (16 MB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PackStreamConfig {
    /// Codec limits
    #[serde(default)]
    pub codec: CodecConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PackStreamConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| PackStreamError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| PackStreamError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| PackStreamError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(depth) = std::env::var("PACKSTREAM_MAX_DEPTH") {
            if let Ok(val) = depth.parse::<usize>() {
                config.codec.max_depth = val;
            }
        }

        if let Ok(len) = std::env::var("PACKSTREAM_MAX_COLLECTION_LEN") {
            if let Ok(val) = len.parse::<usize>() {
                config.codec.max_collection_len = val;
            }
        }

        if let Ok(size) = std::env::var("PACKSTREAM_MAX_PAYLOAD_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.codec.max_payload_size = val;
            }
        }

        if let Ok(level) = std::env::var("PACKSTREAM_LOG_LEVEL") {
            if let Ok(val) = level.parse::<Level>() {
                config.logging.log_level = val;
            }
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
            .map_err(|e| PackStreamError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| PackStreamError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.codec.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PackStreamError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Limits applied by the encoder and decoder
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum structural nesting depth
    pub max_depth: usize,

    /// Maximum elements in a list, pairs in a map or fields in a struct
    pub max_collection_len: usize,

    /// Maximum byte length of a single Bytes or Text payload
    pub max_payload_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_collection_len: DEFAULT_MAX_COLLECTION_LEN,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl CodecConfig {
    /// The configured depth, clamped to [`MAX_DEPTH_CEILING`].
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(MAX_DEPTH_CEILING)
    }

    /// Validate codec limits
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_depth == 0 {
            errors.push("Max depth must be greater than 0".to_string());
        } else if self.max_depth > MAX_DEPTH_CEILING {
            errors.push(format!(
                "Max depth too large: {} (maximum: {MAX_DEPTH_CEILING})",
                self.max_depth
            ));
        }

        if self.max_collection_len == 0 {
            errors.push("Max collection length must be greater than 0".to_string());
        } else if self.max_collection_len > MAX_SIZED_LEN {
            errors.push(format!(
                "Max collection length too large: {} (wire maximum: {MAX_SIZED_LEN})",
                self.max_collection_len
            ));
        }

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size > MAX_SIZED_LEN {
            errors.push(format!(
                "Max payload size too large: {} bytes (wire maximum: {MAX_SIZED_LEN})",
                self.max_payload_size
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
            app_name: String::from("packstream"),
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
