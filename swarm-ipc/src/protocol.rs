//! Wire protocol: inbound bus messages and outbound notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swarm_core::{AggregateResult, RunId, RunStatus};

use crate::error::IpcError;

/// Protocol version stamped on every outbound envelope
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages consumed from the event bus, routed by channel name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel")]
pub enum InboundMessage {
    /// A client asked for a new benchmark
    #[serde(rename = "benchmark.new")]
    BenchmarkNew {
        id: u64,
        domain: String,
        num_servers: usize,
        num_requests: u64,
    },

    /// A run's nodes were reaped outside the coordinator
    #[serde(rename = "benchmark.node_released")]
    NodeReleased { run_id: u64, num_servers: usize },
}

impl InboundMessage {
    /// Decode one line from the bus. Blank lines are rejected.
    pub fn parse(line: &str) -> Result<Self, IpcError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(IpcError::InvalidMessage("empty line".to_string()));
        }
        Ok(serde_json::from_str(line)?)
    }

    /// Channel the message was published on
    pub fn channel(&self) -> &'static str {
        match self {
            InboundMessage::BenchmarkNew { .. } => "benchmark.new",
            InboundMessage::NodeReleased { .. } => "benchmark.node_released",
        }
    }
}

/// Status change of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNotification {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Shared start time, present once the run has been scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Failure reason for terminal failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProgressNotification {
    pub fn new(run_id: RunId, status: RunStatus) -> Self {
        Self {
            run_id,
            status,
            scheduled_at: None,
            reason: None,
        }
    }

    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Final aggregated result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNotification {
    pub run_id: RunId,
    pub min_time: f64,
    pub max_time: f64,
    pub mean_time: f64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub system_error_requests: u64,
}

impl ResultNotification {
    pub fn from_aggregate(run_id: RunId, result: &AggregateResult) -> Self {
        Self {
            run_id,
            min_time: result.min_time,
            max_time: result.max_time,
            mean_time: result.mean_time,
            completed_requests: result.completed_requests,
            failed_requests: result.failed_requests,
            system_error_requests: result.system_error_requests,
        }
    }
}

/// Everything the coordinator publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Progress(ProgressNotification),
    Result(ResultNotification),
}

impl Notification {
    pub fn run_id(&self) -> RunId {
        match self {
            Notification::Progress(p) => p.run_id,
            Notification::Result(r) => r.run_id,
        }
    }

    /// Per-benchmark subscription topic
    pub fn topic(&self) -> String {
        self.run_id().topic()
    }
}

impl From<ProgressNotification> for Notification {
    fn from(progress: ProgressNotification) -> Self {
        Notification::Progress(progress)
    }
}

impl From<ResultNotification> for Notification {
    fn from(result: ResultNotification) -> Self {
        Notification::Result(result)
    }
}

/// Envelope wrapping an outbound notification on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    #[serde(flatten)]
    pub message: T,
}

impl MessageEnvelope<Notification> {
    /// Wrap a notification, addressing it to its run's topic
    pub fn new(message: Notification) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            timestamp: Utc::now(),
            topic: message.topic(),
            message,
        }
    }
}

impl<T> MessageEnvelope<T> {
    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}
