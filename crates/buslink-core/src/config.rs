/*!
 * Configuration management for buslink.
 *
 * This module loads and validates the integration configuration from files
 * and environment variables.
 */
use std::path::Path;
use std::sync::Arc;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Top-level configuration for buslink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// KNX pipeline configuration
    #[serde(default)]
    pub knx: KnxSection,

    /// Z-Wave pipeline configuration
    #[serde(default)]
    pub zwave: ZwaveSection,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Data directory for persisted state (telegram history, etc.)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// KNX pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnxSection {
    /// Individual address the integration uses as telegram source
    #[serde(default = "default_individual_address")]
    pub individual_address: String,

    /// Maximum telegrams kept in the in-memory history ring
    #[serde(default = "default_history_size")]
    pub telegram_history_size: usize,

    /// Outgoing telegram rate limit per second (0 disables limiting)
    #[serde(default)]
    pub rate_limit: u32,
}

/// Z-Wave pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZwaveSection {
    /// Network polling interval in milliseconds
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// How long to wait for a node to become ready before registering
    /// its entities anyway
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Interval between "still waiting" warnings during the readiness wait
    #[serde(default = "default_ready_warn_interval_secs")]
    pub ready_warn_interval_secs: u64,
}

fn default_app_name() -> String {
    "buslink".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_individual_address() -> String {
    "15.15.250".to_string()
}

fn default_history_size() -> usize {
    200
}

fn default_polling_interval_ms() -> u64 {
    60_000
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_ready_warn_interval_secs() -> u64 {
    10
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for KnxSection {
    fn default() -> Self {
        Self {
            individual_address: default_individual_address(),
            telegram_history_size: default_history_size(),
            rate_limit: 0,
        }
    }
}

impl Default for ZwaveSection {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval_ms(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_warn_interval_secs: default_ready_warn_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with `BUSLINK_` environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let config = ConfigLib::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("BUSLINK").separator("__"))
            .build()
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))?;

        let config: Config = config
            .try_deserialize()
            .map_err(|e| Error::config(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        info!("Loaded configuration for {}", config.general.app_name);
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let config = ConfigLib::builder()
            .add_source(Environment::with_prefix("BUSLINK").separator("__"))
            .build()
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))?;

        let config: Config = config
            .try_deserialize()
            .map_err(|e| Error::config(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.knx.telegram_history_size == 0 {
            return Err(Error::config("knx.telegram_history_size must be at least 1"));
        }
        if self.zwave.ready_timeout_secs == 0 {
            return Err(Error::config("zwave.ready_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

/// A shared configuration that can be cloned
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new shared configuration
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.0
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.app_name, "buslink");
        assert_eq!(config.knx.telegram_history_size, 200);
        assert_eq!(config.zwave.ready_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.knx.telegram_history_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.zwave.ready_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_config() {
        let shared = SharedConfig::new(Config::default());
        let clone = shared.clone();
        assert_eq!(
            clone.config().knx.individual_address,
            shared.config().knx.individual_address
        );
    }
}
