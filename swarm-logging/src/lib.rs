//! Structured logging infrastructure for the swarm coordinator
//!
//! Installs a `tracing` subscriber configured from [`LoggingConfig`]. Log
//! output is written to stderr so stdout stays free for notifications.
//! Crates that log through the `log` facade are captured by the same
//! subscriber.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
pub use swarm_config::domains::logging::{LogFormat, LogLevel};
pub use swarm_config::LoggingConfig;
