//! External collaborators: the node provisioner, the per-node agent and the
//! outbound notification sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use url::Url;

use swarm_core::{NodeHandle, NodeResult};
use swarm_ipc::Notification;

use crate::error::{CollaboratorError, NotifyError};

/// Creates and destroys worker nodes
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create `count` nodes. May deliver fewer than requested.
    async fn create_nodes(&self, count: usize) -> Result<Vec<NodeHandle>, CollaboratorError>;

    async fn destroy_nodes(&self, nodes: Vec<NodeHandle>) -> Result<(), CollaboratorError>;
}

/// Load-test agent running on a worker node
#[async_trait]
pub trait NodeAgent: Send + Sync {
    /// Install and configure the load-test agent
    async fn configure(&self, node: &NodeHandle) -> Result<(), CollaboratorError>;

    /// Ask the node to start issuing `requests_per_node` requests at `start_at`
    async fn schedule(
        &self,
        node: &NodeHandle,
        start_at: DateTime<Utc>,
        requests_per_node: u64,
        url: &Url,
    ) -> Result<(), CollaboratorError>;

    async fn collect(&self, node: &NodeHandle) -> Result<NodeResult, CollaboratorError>;
}

/// Delivers outbound notifications to subscribers
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notifier backed by an unbounded channel, drained by the transport writer
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sender
            .send(notification)
            .map_err(|_| NotifyError::ChannelClosed)
    }
}
