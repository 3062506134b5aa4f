//! Resilience patterns for the swarm coordinator
//!
//! This crate provides retry policies with configurable backoff and
//! graceful shutdown coordination with escalating urgency.

pub mod backoff;
pub mod retry;
pub mod shutdown;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownSignal, TaskGuard};
