#![deny(unsafe_code)]

//! Configuration loading and validation for the iscsi-command sidecar.
//!
//! The sidecar reads a small document with two recognized keys, `port` and
//! `socket_path`, plus a few optional knobs for the server process. YAML is
//! the native format (`config.yaml`); files with a `.toml` extension are
//! parsed as TOML instead.
//!
//! ```yaml
//! port: "50051"
//! socket_path: /var/run/iscsi-command.sock
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// On-disk format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension. Anything that is not
    /// `.toml` is treated as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Top-level sidecar configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen port. Kept for compatibility with existing deployments; the
    /// server only listens on the Unix socket.
    #[serde(default = "default_port")]
    pub port: String,

    /// Filesystem path of the Unix domain socket. Required.
    #[serde(default)]
    pub socket_path: String,

    /// Permission bits applied to the socket file after binding.
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Path or name of the `iscsi-ls` executable.
    #[serde(default = "default_iscsi_ls_path")]
    pub iscsi_ls_path: String,

    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            socket_path: String::new(),
            socket_mode: default_socket_mode(),
            iscsi_ls_path: default_iscsi_ls_path(),
            log_level: default_log_level(),
        }
    }
}

fn default_port() -> String {
    "50051".to_string()
}

fn default_socket_mode() -> u32 {
    0o777
}

fn default_iscsi_ls_path() -> String {
    "iscsi-ls".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Load configuration from a file using async I/O. The format is chosen
    /// from the file extension.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let format = ConfigFormat::from_path(path);
        debug!(path = %path.display(), ?format, "Loading configuration");
        match format {
            ConfigFormat::Yaml => Self::parse_yaml(&content),
            ConfigFormat::Toml => Self::parse_toml(&content),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn parse_yaml(s: &str) -> Result<Self, ConfigError> {
        // An empty YAML document deserializes to unit, not to a mapping.
        let config: AppConfig = if s.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(s)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "socket_path is required".to_string(),
            ));
        }
        if self.socket_mode > 0o777 {
            return Err(ConfigError::Validation(format!(
                "socket_mode must be at most 0o777, got {:#o}",
                self.socket_mode
            )));
        }
        if self.iscsi_ls_path.is_empty() {
            return Err(ConfigError::Validation(
                "iscsi_ls_path must not be empty".to_string(),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of {:?}, got {:?}",
                VALID_LOG_LEVELS, self.log_level
            )));
        }
        Ok(())
    }
}
