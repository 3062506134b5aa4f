//! Admission control configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};

/// Capacity available to benchmark runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Total worker-node slots that may be reserved at once
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_slots: default_max_slots(),
        }
    }
}

impl Validatable for AdmissionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_slots, "max_slots", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "admission"
    }
}

fn default_max_slots() -> usize {
    32
}
