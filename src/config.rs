//! JSON configuration for the authority and for services.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("{}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid JSON or lacks a required key
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Authority configuration.
///
/// ```json
/// {"secrets-file": "secrets.json", "port": 5000, "validity-period": "60", "debug": false}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KdcConfig {
    /// Path of the secrets file
    pub secrets_file: PathBuf,
    /// Listen port
    pub port: u16,
    /// Ticket lifetime in seconds
    #[serde(deserialize_with = "seconds")]
    pub validity_period: u64,
    /// Trace every protocol message
    #[serde(default)]
    pub debug: bool,
}

impl KdcConfig {
    /// Parse from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.validity_period == 0 {
            return Err(ConfigError::Invalid("validity-period must be positive".into()));
        }
        Ok(config)
    }

    /// Load from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&read(path.as_ref())?)
    }
}

/// Service configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Identity of the service
    pub service_name: String,
    /// Long-term secret of the service
    #[serde(rename = "service-secret", alias = "secret")]
    pub secret: Zeroizing<String>,
    /// Listen port
    pub port: u16,
    /// Trace every protocol message
    #[serde(default)]
    pub debug: bool,
}

impl ServiceConfig {
    /// Parse from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.service_name.is_empty() {
            return Err(ConfigError::Invalid("service-name must not be empty".into()));
        }
        Ok(config)
    }

    /// Load from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&read(path.as_ref())?)
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("service_name", &self.service_name)
            .field("secret", &"<redacted>")
            .field("port", &self.port)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Seconds given either as a JSON number or as a decimal string.
fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(secs) => Ok(secs),
        Seconds::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
