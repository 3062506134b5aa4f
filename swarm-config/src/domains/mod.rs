//! Domain-specific configuration modules

pub mod admission;
pub mod lifecycle;
pub mod logging;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main coordinator configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SwarmConfig {
    /// Capacity and admission configuration
    #[serde(default)]
    pub admission: admission::AdmissionConfig,

    /// Node lifecycle timing configuration
    #[serde(default)]
    pub lifecycle: lifecycle::LifecycleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl SwarmConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.admission.validate()?;
        self.lifecycle.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = SwarmConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
