//! Configuration management for the Meridian entity server.
//!
//! This module handles loading and validation of the server configuration
//! from a TOML file. Command-line overrides are applied on top by the
//! application before validation.

use meridian_replication::{PersistConfig, TreeConfig, MAX_OCTAL_DEPTH};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default tick interval for serde deserialization
fn default_tick_interval() -> u64 {
    16 // ~60 simulation steps per second
}

fn default_max_datagram_size() -> usize {
    1500
}

/// Application configuration loaded from TOML file.
///
/// Covers networking, the entity tree itself, snapshot persistence and
/// logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Entity tree geometry and role
    #[serde(default)]
    pub tree: TreeConfig,
    /// Snapshot settings
    #[serde(default)]
    pub persist: PersistConfig,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// UDP address to bind the server to (e.g., "127.0.0.1:40107")
    pub bind_address: String,
    /// Simulation tick interval in milliseconds (0 to disable)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Receive buffer size; longer datagrams are truncated by the OS
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// Reasons a configuration is rejected at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("server.max_datagram_size must be between 1 and 65507, got {0}")]
    InvalidDatagramSize(usize),

    #[error("tree.root_scale must be a positive finite number, got {0}")]
    InvalidRootScale(f32),

    #[error("tree.max_depth must be between 1 and 32, got {0}")]
    InvalidMaxDepth(usize),

    #[error("persist.path cannot be empty")]
    EmptyPersistPath,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:40107".to_string(),
                tick_interval_ms: default_tick_interval(),
                max_datagram_size: default_max_datagram_size(),
            },
            tree: TreeConfig::default(),
            persist: PersistConfig::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind_address.clone()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address()?;

        let datagram = self.server.max_datagram_size;
        if datagram == 0 || datagram > MAX_DATAGRAM_SIZE {
            return Err(ConfigError::InvalidDatagramSize(datagram));
        }

        let scale = self.tree.root_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::InvalidRootScale(scale));
        }
        if self.tree.max_depth == 0 || self.tree.max_depth > MAX_OCTAL_DEPTH {
            return Err(ConfigError::InvalidMaxDepth(self.tree.max_depth));
        }

        if self.persist.enabled && self.persist.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPersistPath);
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_replication::TreeRole;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:40107");
        assert_eq!(config.server.tick_interval_ms, 16);
        assert_eq!(config.tree.root_scale, 16384.0);
        assert_eq!(config.tree.role, TreeRole::Authority);
        assert_eq!(config.persist.interval_ms, 30_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBindAddress("invalid".to_string()))
        );

        let mut config = AppConfig::default();
        config.server.max_datagram_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidDatagramSize(0)));
        config.server.max_datagram_size = MAX_DATAGRAM_SIZE + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tree.root_scale = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRootScale(-1.0)));

        let mut config = AppConfig::default();
        config.tree.max_depth = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxDepth(0)));

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[tokio::test]
    async fn test_missing_file_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meridian.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.server.bind_address, AppConfig::default().server.bind_address);

        // The written file must load back to the same settings.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.tree, config.tree);
        assert_eq!(reloaded.persist, config.persist);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meridian.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
bind_address = "0.0.0.0:9000"

[tree]
role = "replica"

[logging]
level = "debug"
json_format = true
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.tick_interval_ms, 16);
        assert_eq!(config.server.max_datagram_size, 1500);
        assert_eq!(config.tree.role, TreeRole::Replica);
        assert_eq!(config.tree.max_depth, 12);
        assert!(config.persist.enabled);
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());
    }
}
