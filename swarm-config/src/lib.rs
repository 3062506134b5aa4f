//! Domain-driven configuration management for the swarm coordinator
//!
//! Configuration is split by functional domain (admission, lifecycle,
//! logging), with validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    admission::AdmissionConfig, lifecycle::LifecycleConfig, logging::LoggingConfig, SwarmConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis};
pub use validation::Validatable;
