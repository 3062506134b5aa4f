//! Core domain models and types for the benchmark swarm coordinator
//!
//! This crate contains the fundamental types used throughout the
//! coordinator: benchmark requests, runs, worker nodes and their results.
//! It has minimal dependencies and does no I/O.

pub mod error;
pub mod node;
pub mod request;
pub mod result;
pub mod run;

// Re-export commonly used types at the crate root
pub use error::{CoreError, Result};
pub use node::{NodeHandle, NodeId, NodeState, WorkerNode};
pub use request::{BenchmarkRequest, RunId};
pub use result::{AggregateResult, NodeResult};
pub use run::{BenchmarkRun, RunStatus};
