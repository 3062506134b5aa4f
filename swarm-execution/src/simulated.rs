//! In-process stand-ins for the cloud provisioner and the node agent

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use swarm_core::{NodeHandle, NodeResult};

use crate::collaborators::{NodeAgent, Provisioner};
use crate::error::CollaboratorError;

/// Behaviour of the simulated collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Delay added to every call
    pub latency: Duration,
    /// Probability that a single per-node call fails
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(50),
            failure_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    fn roll_failure(&self) -> bool {
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate.min(1.0))
    }
}

/// Hands out numbered fake nodes
#[derive(Debug, Default)]
pub struct SimulatedProvisioner {
    config: SimulationConfig,
    next_node: AtomicU64,
    live: Mutex<HashMap<String, NodeHandle>>,
}

impl SimulatedProvisioner {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            next_node: AtomicU64::new(0),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Nodes created and not yet destroyed
    pub fn live_nodes(&self) -> usize {
        self.live.lock().len()
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    async fn create_nodes(&self, count: usize) -> Result<Vec<NodeHandle>, CollaboratorError> {
        sleep(self.config.latency).await;

        let handles: Vec<NodeHandle> = (0..count)
            .map(|_| {
                let n = self.next_node.fetch_add(1, Ordering::Relaxed);
                NodeHandle::new(
                    format!("sim-{}", n),
                    format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff),
                )
            })
            .collect();

        let mut live = self.live.lock();
        for handle in &handles {
            live.insert(handle.instance_id.clone(), handle.clone());
        }
        debug!(count, live = live.len(), "Simulated nodes created");
        Ok(handles)
    }

    async fn destroy_nodes(&self, nodes: Vec<NodeHandle>) -> Result<(), CollaboratorError> {
        sleep(self.config.latency).await;

        let mut live = self.live.lock();
        for node in &nodes {
            live.remove(&node.instance_id);
        }
        debug!(count = nodes.len(), live = live.len(), "Simulated nodes destroyed");
        Ok(())
    }
}

/// Agent that fabricates plausible latency figures
#[derive(Debug, Default)]
pub struct SimulatedAgent {
    config: SimulationConfig,
    /// Requests each scheduled node was asked to issue
    scheduled: Mutex<HashMap<String, u64>>,
}

impl SimulatedAgent {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            scheduled: Mutex::new(HashMap::new()),
        }
    }

    fn fail_randomly(&self, node: &NodeHandle, call: &str) -> Result<(), CollaboratorError> {
        if self.config.roll_failure() {
            return Err(CollaboratorError::Unavailable(format!(
                "simulated {} failure on {}",
                call, node.instance_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeAgent for SimulatedAgent {
    async fn configure(&self, node: &NodeHandle) -> Result<(), CollaboratorError> {
        sleep(self.config.latency).await;
        self.fail_randomly(node, "configure")
    }

    async fn schedule(
        &self,
        node: &NodeHandle,
        start_at: DateTime<Utc>,
        requests_per_node: u64,
        url: &Url,
    ) -> Result<(), CollaboratorError> {
        sleep(self.config.latency).await;
        self.fail_randomly(node, "schedule")?;

        debug!(
            instance = %node.instance_id,
            %start_at,
            requests_per_node,
            %url,
            "Simulated benchmark scheduled"
        );
        self.scheduled
            .lock()
            .insert(node.instance_id.clone(), requests_per_node);
        Ok(())
    }

    async fn collect(&self, node: &NodeHandle) -> Result<NodeResult, CollaboratorError> {
        sleep(self.config.latency).await;
        self.fail_randomly(node, "collect")?;

        let requests = self
            .scheduled
            .lock()
            .remove(&node.instance_id)
            .ok_or_else(|| {
                CollaboratorError::Rejected(format!("{} was never scheduled", node.instance_id))
            })?;

        let mut rng = rand::thread_rng();
        let failed = rng.gen_range(0..=requests / 20);
        let min = rng.gen_range(5.0..20.0);
        let mean = min + rng.gen_range(10.0..80.0);
        let max = mean + rng.gen_range(10.0..200.0);

        Ok(NodeResult {
            min,
            max,
            mean,
            completed_requests: requests - failed,
            failed_requests: failed,
            system_error_requests: 0,
        })
    }
}
