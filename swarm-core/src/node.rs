//! Worker node domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a worker node (newtype pattern for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned by the external provisioner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Provider-side instance identifier
    pub instance_id: String,
    /// Address the node agent is reachable on
    pub address: String,
}

impl NodeHandle {
    pub fn new(instance_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            address: address.into(),
        }
    }
}

/// Lifecycle state of a single worker node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Provisioning,
    Configuring,
    Scheduled,
    Running,
    Collected,
    Failed,
    Released,
}

impl NodeState {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Provisioning => "provisioning",
            NodeState::Configuring => "configuring",
            NodeState::Scheduled => "scheduled",
            NodeState::Running => "running",
            NodeState::Collected => "collected",
            NodeState::Failed => "failed",
            NodeState::Released => "released",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A worker node owned by exactly one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNode {
    pub id: NodeId,
    pub handle: NodeHandle,
    pub state: NodeState,
    pub last_error: Option<String>,
}

impl WorkerNode {
    /// Wrap a freshly provisioned handle
    pub fn new(handle: NodeHandle) -> Self {
        Self {
            id: NodeId::new(),
            handle,
            state: NodeState::Provisioning,
            last_error: None,
        }
    }

    /// Whether the node is still taking part in the run
    pub fn is_survivor(&self) -> bool {
        !matches!(self.state, NodeState::Failed | NodeState::Released)
    }

    /// Move a surviving node to `state`. Failed and released nodes stay put.
    pub fn advance(&mut self, state: NodeState) {
        if self.is_survivor() {
            self.state = state;
        }
    }

    /// Demote the node to Failed, keeping the error for diagnostics
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = NodeState::Failed;
        self.last_error = Some(error.into());
    }

    pub fn release(&mut self) {
        self.state = NodeState::Released;
    }
}
