//! Node lifecycle configuration

use crate::error::ConfigResult;
use crate::validation::{validate_at_most, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and tolerance settings for a run's node lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Estimated setup time per node, used to place the shared start timestamp
    #[serde(
        rename = "setup_margin_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_setup_margin"
    )]
    pub setup_margin: Duration,

    /// Upper bound on the provisioner call
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_provision_timeout"
    )]
    pub provision_timeout: Duration,

    /// Upper bound on each per-node configure, schedule and collect call
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_node_call_timeout"
    )]
    pub node_call_timeout: Duration,

    /// Attempts made to release nodes before giving up
    #[serde(default = "default_release_attempts")]
    pub release_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            setup_margin: default_setup_margin(),
            provision_timeout: default_provision_timeout(),
            node_call_timeout: default_node_call_timeout(),
            release_attempts: default_release_attempts(),
        }
    }
}

impl Validatable for LifecycleConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.provision_timeout.as_secs(),
            "provision_timeout",
            self.domain_name(),
        )?;

        validate_positive(
            self.node_call_timeout.as_secs(),
            "node_call_timeout",
            self.domain_name(),
        )?;

        validate_positive(self.release_attempts, "release_attempts", self.domain_name())?;
        validate_at_most(self.release_attempts, 10, "release_attempts", self.domain_name())?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "lifecycle"
    }
}

// Default value functions
fn default_setup_margin() -> Duration {
    Duration::from_millis(1500)
}

fn default_provision_timeout() -> Duration {
    Duration::from_secs(600) // 10 minutes
}

fn default_node_call_timeout() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

fn default_release_attempts() -> u32 {
    3
}
