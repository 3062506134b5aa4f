//! Benchmark run domain model and coarse run status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::{NodeHandle, NodeState, WorkerNode};
use crate::request::{BenchmarkRequest, RunId};
use crate::result::AggregateResult;

/// Coarse status of a benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Queued and waiting for capacity
    Pending,
    Provisioning,
    Configuring,
    Scheduling,
    Running,
    Collecting,
    Completed,
    Failed,
}

impl RunStatus {
    /// Check if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Position in the forward lifecycle. Failed sorts after everything.
    pub fn ordinal(&self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Provisioning => 1,
            RunStatus::Configuring => 2,
            RunStatus::Scheduling => 3,
            RunStatus::Running => 4,
            RunStatus::Collecting => 5,
            RunStatus::Completed => 6,
            RunStatus::Failed => 7,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Provisioning => "provisioning",
            RunStatus::Configuring => "configuring",
            RunStatus::Scheduling => "scheduling",
            RunStatus::Running => "running",
            RunStatus::Collecting => "collecting",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One admitted request's full execution. Owned by a single lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub request: BenchmarkRequest,
    pub nodes: Vec<WorkerNode>,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<AggregateResult>,
}

impl BenchmarkRun {
    /// Create a run for an admitted request
    pub fn new(request: BenchmarkRequest) -> Self {
        Self {
            request,
            nodes: Vec::new(),
            status: RunStatus::Pending,
            started_at: None,
            scheduled_at: None,
            completed_at: None,
            result: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.request.id
    }

    /// Take ownership of provisioned node handles
    pub fn attach_nodes(&mut self, handles: Vec<NodeHandle>) {
        self.nodes.extend(handles.into_iter().map(WorkerNode::new));
    }

    /// Nodes that have not failed
    pub fn survivors(&self) -> impl Iterator<Item = &WorkerNode> {
        self.nodes.iter().filter(|n| n.is_survivor())
    }

    pub fn survivor_count(&self) -> usize {
        self.survivors().count()
    }

    /// Move every surviving node to `state`
    pub fn advance_survivors(&mut self, state: NodeState) {
        for node in self.nodes.iter_mut() {
            node.advance(state);
        }
    }

    /// Handles of every node still held by the run (not yet released)
    pub fn held_handles(&self) -> Vec<NodeHandle> {
        self.nodes
            .iter()
            .filter(|n| n.state != NodeState::Released)
            .map(|n| n.handle.clone())
            .collect()
    }

    pub fn mark_nodes_released(&mut self) {
        for node in self.nodes.iter_mut() {
            node.release();
        }
    }

    /// Update the status. Terminal statuses are never left.
    pub fn set_status(&mut self, status: RunStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }

    /// Timestamps are set once and never rewound
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.started_at.get_or_insert(at);
    }

    pub fn mark_scheduled(&mut self, at: DateTime<Utc>) {
        self.scheduled_at.get_or_insert(at);
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.completed_at.get_or_insert(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_nodes(count: usize) -> BenchmarkRun {
        let mut run = BenchmarkRun::new(BenchmarkRequest::new(7, "example.com", count, 10));
        run.attach_nodes(
            (0..count)
                .map(|i| NodeHandle::new(format!("i-{}", i), format!("10.0.0.{}", i)))
                .collect(),
        );
        run
    }

    #[test]
    fn test_survivors() {
        let mut run = run_with_nodes(3);
        assert_eq!(run.survivor_count(), 3);

        run.nodes[1].fail("timeout");
        run.advance_survivors(NodeState::Configuring);
        assert_eq!(run.survivor_count(), 2);
        assert_eq!(run.nodes[0].state, NodeState::Configuring);
        assert_eq!(run.nodes[1].state, NodeState::Failed);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut run = run_with_nodes(1);
        run.set_status(RunStatus::Failed);
        run.set_status(RunStatus::Completed);
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_timestamps_set_once() {
        let mut run = run_with_nodes(1);
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(5);

        run.mark_started(first);
        run.mark_started(later);
        assert_eq!(run.started_at, Some(first));
    }

    #[test]
    fn test_held_handles_excludes_released() {
        let mut run = run_with_nodes(2);
        assert_eq!(run.held_handles().len(), 2);
        run.mark_nodes_released();
        assert!(run.held_handles().is_empty());
    }

    #[test]
    fn test_status_ordering() {
        assert!(RunStatus::Pending.ordinal() < RunStatus::Provisioning.ordinal());
        assert!(RunStatus::Collecting.ordinal() < RunStatus::Completed.ordinal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert_eq!(
            serde_json::to_string(&RunStatus::Scheduling).unwrap(),
            "\"scheduling\""
        );
    }
}
