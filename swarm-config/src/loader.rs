//! Configuration loading and environment variable handling

use crate::domains::SwarmConfig;
use crate::error::{ConfigError, ConfigResult};
use log::debug;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "SWARM".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<SwarmConfig> {
        debug!("Loading configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        let mut config: SwarmConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<SwarmConfig> {
        let mut config = SwarmConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<SwarmConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut SwarmConfig) -> ConfigResult<()> {
        self.apply_admission_overrides(&mut config.admission)?;
        self.apply_lifecycle_overrides(&mut config.lifecycle)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_admission_overrides(
        &self,
        config: &mut crate::domains::admission::AdmissionConfig,
    ) -> ConfigResult<()> {
        if let Some(max_slots) = self.parse_env_var::<usize>("MAX_SLOTS")? {
            config.max_slots = max_slots;
        }
        Ok(())
    }

    fn apply_lifecycle_overrides(
        &self,
        config: &mut crate::domains::lifecycle::LifecycleConfig,
    ) -> ConfigResult<()> {
        if let Some(millis) = self.parse_env_var::<u64>("SETUP_MARGIN_MS")? {
            config.setup_margin = Duration::from_millis(millis);
        }

        if let Some(seconds) = self.parse_env_var::<u64>("PROVISION_TIMEOUT")? {
            config.provision_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = self.parse_env_var::<u64>("NODE_CALL_TIMEOUT")? {
            config.node_call_timeout = Duration::from_secs(seconds);
        }

        if let Some(attempts) = self.parse_env_var::<u32>("RELEASE_ATTEMPTS")? {
            config.release_attempts = attempts;
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Read and parse a prefixed variable, `None` when it is unset
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e))),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
