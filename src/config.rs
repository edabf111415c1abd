//! Configuration for the Hana early-warning agent.

use crate::core::EngineConfig;
use crate::gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Thresholds and windows for the detection pipeline
    pub engine: EngineConfig,

    /// Path for storing the journal and exported events
    pub data_path: PathBuf,

    /// Per-session queue capacity between the router and a session worker
    pub queue_capacity: usize,

    /// Session ID used when input samples are not tagged with one
    pub default_session: Option<String>,

    /// Port for the HTTP ingest server
    pub server_port: u16,

    /// Server sessions without a sample for this long are ended (0 disables)
    pub session_idle_secs: u64,

    /// Backend endpoint for forwarding warning events
    pub gateway: Option<GatewayConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hana-early-warning");

        Self {
            engine: EngineConfig::default(),
            data_path: data_dir,
            queue_capacity: 1024,
            default_session: None,
            server_port: 7420,
            session_idle_secs: 30 * 60,
            gateway: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hana-early-warning")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of the persisted journal counters.
    pub fn journal_path(&self) -> PathBuf {
        self.data_path.join("journal.json")
    }

    /// Idle timeout for server sessions, if enabled.
    pub fn session_idle_timeout(&self) -> Option<std::time::Duration> {
        (self.session_idle_secs > 0).then(|| std::time::Duration::from_secs(self.session_idle_secs))
    }

    /// Validate every threshold table before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidThreshold(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        self.engine.validate()
    }
}

/// Configuration errors.
///
/// Threshold and timezone errors are fatal at startup: the engine refuses to
/// run with a table that could misclassify severity.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.gateway.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"queue_capacity": 16, "engine": {"detector": {"confidence_floor": 0.5}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.engine.detector.confidence_floor, 0.5);
        assert_eq!(config.engine.window.max_samples, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_idle_timeout() {
        assert_eq!(
            Config::default().session_idle_timeout(),
            Some(std::time::Duration::from_secs(1800))
        );

        let config = Config {
            session_idle_secs: 0,
            ..Default::default()
        };
        assert!(config.session_idle_timeout().is_none());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let config = Config {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }
}
