//! Error types for admission and lifecycle orchestration

use std::time::Duration;
use thiserror::Error;

use swarm_core::{CoreError, RunId, RunStatus};
use swarm_resilience::Retryable;

/// Run-level failures. Any of these moves a run to Failed.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(#[source] CollaboratorError),

    #[error("Provisioner delivered {delivered} of {requested} nodes")]
    PartialProvisioning { requested: usize, delivered: usize },

    #[error("No surviving nodes after {stage}")]
    NoSurvivors { stage: RunStatus },

    #[error("No node reported results")]
    NoResults,

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("Duplicate run id {0}")]
    DuplicateRun(RunId),

    #[error("Coordinator is shutting down")]
    ShuttingDown,
}

/// Failure of a single call to the provisioner or a node agent
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl Retryable for CollaboratorError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable(_) | CollaboratorError::Timeout(_)
        )
    }
}

/// Outbound notification could not be delivered
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    ChannelClosed,
}

/// Returned by `AdmissionQueue::pop` on an empty queue
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Admission queue is empty")]
pub struct EmptyQueueError;
