//! Run progress recorder

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use swarm_core::{RunId, RunStatus};
use swarm_ipc::ProgressNotification;

use crate::collaborators::Notifier;

/// What the recorder knows about one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    pub created_on: Option<DateTime<Utc>>,
    pub started_on: Option<DateTime<Utc>>,
    pub scheduled_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl RunRecord {
    fn new(run_id: RunId, status: RunStatus) -> Self {
        Self {
            run_id,
            status,
            created_on: None,
            started_on: None,
            scheduled_on: None,
            completed_on: None,
            failure_reason: None,
        }
    }

    /// Time from provisioning start to completion
    pub fn completion_time(&self) -> Option<Duration> {
        Some(self.completed_on? - self.started_on?)
    }
}

/// Passive recorder of run status changes.
///
/// Status only moves forward and terminal statuses are final, so duplicate
/// or late deliveries are ignored. Timestamps are set once. Every accepted
/// change is republished to the notifier.
pub struct ProgressRecorder {
    records: RwLock<HashMap<RunId, RunRecord>>,
    notifier: Arc<dyn Notifier>,
}

impl ProgressRecorder {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    /// Record that `run_id` entered `status` at `at`.
    ///
    /// For `Scheduling`, `at` is the computed shared start time. Returns
    /// whether the record changed.
    pub fn record(&self, run_id: RunId, status: RunStatus, at: DateTime<Utc>) -> bool {
        self.apply(run_id, status, at, None)
    }

    /// Record a terminal failure with its reason
    pub fn record_failure(&self, run_id: RunId, at: DateTime<Utc>, reason: impl Into<String>) -> bool {
        self.apply(run_id, RunStatus::Failed, at, Some(reason.into()))
    }

    fn apply(
        &self,
        run_id: RunId,
        status: RunStatus,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> bool {
        let notification = {
            let mut records = self.records.write();
            let (record, is_new) = match records.entry(run_id) {
                Entry::Occupied(entry) => (entry.into_mut(), false),
                Entry::Vacant(entry) => (entry.insert(RunRecord::new(run_id, status)), true),
            };

            let moved = status.ordinal() > record.status.ordinal();
            if !is_new && (record.status.is_terminal() || !moved) {
                debug!(
                    run_id = %run_id,
                    current = %record.status,
                    ignored = %status,
                    "Ignoring stale progress update"
                );
                return false;
            }

            record.status = status;
            let slot = match status {
                RunStatus::Pending => Some(&mut record.created_on),
                RunStatus::Provisioning => Some(&mut record.started_on),
                RunStatus::Scheduling => Some(&mut record.scheduled_on),
                RunStatus::Completed => Some(&mut record.completed_on),
                _ => None,
            };
            if let Some(slot) = slot {
                slot.get_or_insert(at);
            }

            let mut notification = ProgressNotification::new(run_id, status);
            if status == RunStatus::Scheduling {
                notification.scheduled_at = record.scheduled_on;
            }
            if let Some(reason) = reason {
                record.failure_reason = Some(reason.clone());
                notification.reason = Some(reason);
            }
            notification
        };

        if let Err(e) = self.notifier.publish(notification.into()) {
            warn!(run_id = %run_id, status = %status, "Failed to publish progress: {}", e);
        }
        true
    }

    pub fn get(&self, run_id: RunId) -> Option<RunRecord> {
        self.records.read().get(&run_id).cloned()
    }

    pub fn status(&self, run_id: RunId) -> Option<RunStatus> {
        self.records.read().get(&run_id).map(|r| r.status)
    }

    pub fn is_terminal(&self, run_id: RunId) -> bool {
        self.status(run_id).is_some_and(|s| s.is_terminal())
    }

    /// Ids of every run currently in `status`, ascending
    pub fn runs_with_status(&self, status: RunStatus) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self
            .records
            .read()
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.run_id)
            .collect();
        ids.sort();
        ids
    }

    /// Mean provisioning-to-completion time of completed runs
    pub fn average_completion_time(&self) -> Option<Duration> {
        let records = self.records.read();
        let times: Vec<Duration> = records
            .values()
            .filter(|r| r.status == RunStatus::Completed)
            .filter_map(RunRecord::completion_time)
            .collect();
        if times.is_empty() {
            return None;
        }

        let total_ms: i64 = times.iter().map(|d| d.num_milliseconds()).sum();
        Some(Duration::milliseconds(total_ms / times.len() as i64))
    }
}
