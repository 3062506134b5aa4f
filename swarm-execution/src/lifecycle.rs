//! Per-run node lifecycle manager
//!
//! One manager drives one admitted run through
//! Provisioning, Configuring, Scheduling, Running, Collecting and finally
//! Completed, or Failed from any step. Per-node failures demote that node
//! and the run carries on with the survivors; the run fails only when
//! provisioning fails or no node survives a step.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use swarm_config::LifecycleConfig;
use swarm_core::{AggregateResult, BenchmarkRequest, BenchmarkRun, NodeHandle, NodeState, RunStatus};
use swarm_ipc::ResultNotification;
use swarm_resilience::{RetryExecutor, RetryPolicy};

use crate::admission::SlotReservation;
use crate::collaborators::{NodeAgent, Notifier, Provisioner};
use crate::error::{CollaboratorError, ExecutionError};
use crate::progress::ProgressRecorder;

/// Pause between node release attempts, growing linearly
const RELEASE_RETRY_DELAY: Duration = Duration::from_secs(1);

type NodeOutcome<T> = (usize, Result<T, CollaboratorError>);

/// Start time shared by all survivors: `now + setup_margin * survivors`,
/// saturating at the latest representable instant
fn shared_start_time(now: DateTime<Utc>, setup_margin: Duration, survivors: usize) -> DateTime<Utc> {
    let margin = setup_margin.saturating_mul(u32::try_from(survivors).unwrap_or(u32::MAX));
    chrono::Duration::from_std(margin)
        .ok()
        .and_then(|margin| now.checked_add_signed(margin))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Drives a single admitted run to a terminal status
pub struct NodeLifecycleManager {
    run: BenchmarkRun,
    reservation: SlotReservation,
    provisioner: Arc<dyn Provisioner>,
    agent: Arc<dyn NodeAgent>,
    recorder: Arc<ProgressRecorder>,
    notifier: Arc<dyn Notifier>,
    config: LifecycleConfig,
}

impl NodeLifecycleManager {
    pub fn new(
        request: BenchmarkRequest,
        reservation: SlotReservation,
        provisioner: Arc<dyn Provisioner>,
        agent: Arc<dyn NodeAgent>,
        recorder: Arc<ProgressRecorder>,
        notifier: Arc<dyn Notifier>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            run: BenchmarkRun::new(request),
            reservation,
            provisioner,
            agent,
            recorder,
            notifier,
            config,
        }
    }

    /// Run to completion. Nodes and slots are always released before this
    /// returns; the finished run is handed back for inspection.
    pub async fn run(mut self) -> BenchmarkRun {
        info!(
            run_id = %self.run.id(),
            nodes = self.run.request.num_nodes,
            requests_per_node = self.run.request.requests_per_node,
            "Starting benchmark run"
        );

        match self.execute().await {
            Ok(result) => self.complete(result).await,
            Err(e) => self.fail(e).await,
        }
        self.run
    }

    async fn execute(&mut self) -> Result<AggregateResult, ExecutionError> {
        self.provision().await?;
        self.configure().await?;
        let start_at = self.schedule().await?;
        self.wait_until(start_at).await;
        self.collect().await
    }

    fn transition(&mut self, status: RunStatus, at: DateTime<Utc>) {
        debug!(run_id = %self.run.id(), from = %self.run.status, to = %status, "Run transition");
        self.run.set_status(status);
        match status {
            RunStatus::Provisioning => self.run.mark_started(at),
            RunStatus::Scheduling => self.run.mark_scheduled(at),
            RunStatus::Completed => self.run.mark_completed(at),
            _ => {}
        }
        self.recorder.record(self.run.id(), status, at);
    }

    async fn provision(&mut self) -> Result<(), ExecutionError> {
        self.transition(RunStatus::Provisioning, Utc::now());
        let requested = self.run.request.num_nodes;

        let handles = match timeout(
            self.config.provision_timeout,
            self.provisioner.create_nodes(requested),
        )
        .await
        {
            Ok(Ok(handles)) => handles,
            Ok(Err(e)) => return Err(ExecutionError::ProvisioningFailed(e)),
            Err(_) => {
                return Err(ExecutionError::ProvisioningFailed(
                    CollaboratorError::Timeout(self.config.provision_timeout),
                ))
            }
        };

        // Attach before checking the count so a short delivery is still released
        let delivered = handles.len();
        self.run.attach_nodes(handles);
        if delivered != requested {
            return Err(ExecutionError::PartialProvisioning {
                requested,
                delivered,
            });
        }

        info!(run_id = %self.run.id(), nodes = delivered, "Nodes provisioned");
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), ExecutionError> {
        self.transition(RunStatus::Configuring, Utc::now());
        self.run.advance_survivors(NodeState::Configuring);

        let outcomes = self
            .on_survivors(|agent, node| async move { agent.configure(&node).await })
            .await;
        self.absorb_failures(RunStatus::Configuring, outcomes)?;
        Ok(())
    }

    async fn schedule(&mut self) -> Result<DateTime<Utc>, ExecutionError> {
        let url = self.run.request.target_url()?;
        let survivors = self.run.survivor_count();
        let start_at = shared_start_time(Utc::now(), self.config.setup_margin, survivors);
        let requests_per_node = self.run.request.requests_per_node;

        self.transition(RunStatus::Scheduling, start_at);
        let outcomes = self
            .on_survivors(|agent, node| {
                let url = url.clone();
                async move {
                    agent
                        .schedule(&node, start_at, requests_per_node, &url)
                        .await
                }
            })
            .await;
        self.absorb_failures(RunStatus::Scheduling, outcomes)?;
        self.run.advance_survivors(NodeState::Scheduled);

        self.transition(RunStatus::Running, Utc::now());
        self.run.advance_survivors(NodeState::Running);
        Ok(start_at)
    }

    /// Sleep until `start_at`, measured from now rather than from when the
    /// start time was computed
    async fn wait_until(&self, start_at: DateTime<Utc>) {
        if let Ok(remaining) = (start_at - Utc::now()).to_std() {
            if !remaining.is_zero() {
                debug!(run_id = %self.run.id(), wait = ?remaining, "Waiting for shared start time");
                sleep(remaining).await;
            }
        }
    }

    async fn collect(&mut self) -> Result<AggregateResult, ExecutionError> {
        self.transition(RunStatus::Collecting, Utc::now());

        let outcomes = self
            .on_survivors(|agent, node| async move { agent.collect(&node).await })
            .await;
        let results: Vec<_> = self
            .absorb_failures(RunStatus::Collecting, outcomes)?
            .into_iter()
            .map(|(index, result)| {
                self.run.nodes[index].advance(NodeState::Collected);
                result
            })
            .collect();

        let unreachable = (self.run.nodes.len() - results.len()) as u64;
        let unreachable_requests = unreachable.saturating_mul(self.run.request.requests_per_node);
        if unreachable > 0 {
            info!(
                run_id = %self.run.id(),
                unreachable,
                unreachable_requests,
                "Counting requests of nodes without results as failed"
            );
        }

        AggregateResult::aggregate(&results, unreachable_requests).ok_or(ExecutionError::NoResults)
    }

    /// Call `op` on every surviving node concurrently, each bounded by the
    /// node call timeout. Outcomes carry the node's index.
    async fn on_survivors<T, F, Fut>(&self, op: F) -> Vec<NodeOutcome<T>>
    where
        F: Fn(Arc<dyn NodeAgent>, NodeHandle) -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let limit = self.config.node_call_timeout;
        let calls = self
            .run
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_survivor())
            .map(|(index, node)| {
                let call = op(self.agent.clone(), node.handle.clone());
                async move {
                    let outcome = timeout(limit, call)
                        .await
                        .unwrap_or(Err(CollaboratorError::Timeout(limit)));
                    (index, outcome)
                }
            });
        join_all(calls).await
    }

    /// Demote nodes whose call failed. Fails the run when nobody is left.
    fn absorb_failures<T>(
        &mut self,
        stage: RunStatus,
        outcomes: Vec<NodeOutcome<T>>,
    ) -> Result<Vec<(usize, T)>, ExecutionError> {
        let mut succeeded = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes {
            match outcome {
                Ok(value) => succeeded.push((index, value)),
                Err(e) => {
                    let node = &mut self.run.nodes[index];
                    warn!(
                        run_id = %self.run.request.id,
                        instance = %node.handle.instance_id,
                        stage = %stage,
                        "Node failed: {}", e
                    );
                    node.fail(e.to_string());
                }
            }
        }

        if self.run.survivor_count() == 0 {
            return Err(ExecutionError::NoSurvivors { stage });
        }
        Ok(succeeded)
    }

    async fn complete(&mut self, result: AggregateResult) {
        self.release().await;

        let run_id = self.run.id();
        info!(
            run_id = %run_id,
            reporting_nodes = result.reporting_nodes,
            completed_requests = result.completed_requests,
            failed_requests = result.failed_requests,
            mean_time = result.mean_time,
            "Benchmark completed"
        );

        let notification = ResultNotification::from_aggregate(run_id, &result);
        self.run.result = Some(result);
        self.transition(RunStatus::Completed, Utc::now());

        if let Err(e) = self.notifier.publish(notification.into()) {
            warn!(run_id = %run_id, "Failed to publish result: {}", e);
        }
    }

    async fn fail(&mut self, err: ExecutionError) {
        let run_id = self.run.id();
        error!(run_id = %run_id, status = %self.run.status, "Benchmark failed: {}", err);

        self.release().await;
        self.run.set_status(RunStatus::Failed);
        self.recorder.record_failure(run_id, Utc::now(), err.to_string());
    }

    /// Release nodes best-effort, then always release the ledger slots
    async fn release(&mut self) {
        self.release_nodes().await;
        self.reservation.release();
    }

    async fn release_nodes(&mut self) {
        let handles = self.run.held_handles();
        if handles.is_empty() {
            return;
        }

        let count = handles.len();
        let limit = self.config.node_call_timeout;
        let retry = RetryExecutor::new(RetryPolicy::linear(
            self.config.release_attempts,
            RELEASE_RETRY_DELAY,
        ));
        let provisioner = self.provisioner.clone();

        let outcome = retry
            .execute(|| {
                let provisioner = provisioner.clone();
                let handles = handles.clone();
                async move {
                    timeout(limit, provisioner.destroy_nodes(handles))
                        .await
                        .unwrap_or(Err(CollaboratorError::Timeout(limit)))
                }
            })
            .await;

        match outcome {
            Ok(()) => {
                self.run.mark_nodes_released();
                debug!(run_id = %self.run.id(), nodes = count, "Nodes released");
            }
            Err(e) => {
                error!(
                    run_id = %self.run.id(),
                    nodes = count,
                    "Giving up on releasing nodes: {}", e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionControl;
    use crate::collaborators::ChannelNotifier;
    use async_trait::async_trait;
    use mockall::mock;
    use swarm_core::{NodeResult, RunId};
    use swarm_ipc::Notification;
    use tokio::sync::mpsc::UnboundedReceiver;
    use url::Url;

    mock! {
        pub Provisioner {}

        #[async_trait]
        impl Provisioner for Provisioner {
            async fn create_nodes(&self, count: usize) -> Result<Vec<NodeHandle>, CollaboratorError>;
            async fn destroy_nodes(&self, nodes: Vec<NodeHandle>) -> Result<(), CollaboratorError>;
        }
    }

    mock! {
        pub Agent {}

        #[async_trait]
        impl NodeAgent for Agent {
            async fn configure(&self, node: &NodeHandle) -> Result<(), CollaboratorError>;
            async fn schedule(
                &self,
                node: &NodeHandle,
                start_at: DateTime<Utc>,
                requests_per_node: u64,
                url: &Url,
            ) -> Result<(), CollaboratorError>;
            async fn collect(&self, node: &NodeHandle) -> Result<NodeResult, CollaboratorError>;
        }
    }

    const REQUESTS_PER_NODE: u64 = 10;

    fn handles(count: usize) -> Vec<NodeHandle> {
        (0..count)
            .map(|i| NodeHandle::new(format!("i-{}", i), format!("10.0.0.{}", i)))
            .collect()
    }

    fn node_result(mean: f64) -> NodeResult {
        NodeResult {
            min: mean / 2.0,
            max: mean * 2.0,
            mean,
            completed_requests: 9,
            failed_requests: 1,
            system_error_requests: 0,
        }
    }

    fn provisioner_delivering(count: usize) -> MockProvisioner {
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_create_nodes()
            .times(1)
            .returning(move |_| Ok(handles(count)));
        provisioner
    }

    fn healthy_agent() -> MockAgent {
        let mut agent = MockAgent::new();
        agent.expect_configure().returning(|_| Ok(()));
        agent.expect_schedule().returning(|_, _, _, _| Ok(()));
        agent.expect_collect().returning(|_| Ok(node_result(20.0)));
        agent
    }

    struct Harness {
        admission: Arc<AdmissionControl>,
        recorder: Arc<ProgressRecorder>,
        notifier: Arc<ChannelNotifier>,
        notifications: UnboundedReceiver<Notification>,
    }

    impl Harness {
        fn new() -> Self {
            let (notifier, notifications) = ChannelNotifier::new();
            let notifier = Arc::new(notifier);
            Self {
                admission: Arc::new(AdmissionControl::new(32)),
                recorder: Arc::new(ProgressRecorder::new(notifier.clone())),
                notifier,
                notifications,
            }
        }

        fn manager(
            &self,
            nodes: usize,
            provisioner: MockProvisioner,
            agent: MockAgent,
        ) -> NodeLifecycleManager {
            self.manager_with_requests(nodes, REQUESTS_PER_NODE, provisioner, agent)
        }

        fn manager_with_requests(
            &self,
            nodes: usize,
            requests_per_node: u64,
            provisioner: MockProvisioner,
            agent: MockAgent,
        ) -> NodeLifecycleManager {
            let request = BenchmarkRequest::new(1, "example.com", nodes, requests_per_node);
            self.admission.enqueue(request.clone());
            let entry = self.admission.try_admit_next().unwrap();
            assert_eq!(entry.request.id, RunId(1));

            let config = LifecycleConfig {
                setup_margin: Duration::from_millis(1500),
                provision_timeout: Duration::from_secs(60),
                node_call_timeout: Duration::from_secs(30),
                release_attempts: 2,
            };
            NodeLifecycleManager::new(
                request,
                SlotReservation::new(self.admission.clone(), RunId(1)),
                Arc::new(provisioner),
                Arc::new(agent),
                self.recorder.clone(),
                self.notifier.clone(),
                config,
            )
        }

        fn statuses(&mut self) -> Vec<RunStatus> {
            let mut statuses = Vec::new();
            while let Ok(notification) = self.notifications.try_recv() {
                if let Notification::Progress(p) = notification {
                    statuses.push(p.status);
                }
            }
            statuses
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run() {
        let mut harness = Harness::new();
        let mut provisioner = provisioner_delivering(3);
        provisioner
            .expect_destroy_nodes()
            .withf(|nodes| nodes.len() == 3)
            .times(1)
            .returning(|_| Ok(()));

        let manager = harness.manager(3, provisioner, healthy_agent());
        assert_eq!(harness.admission.available(), 29);

        let run = manager.run().await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(harness.admission.available(), 32);
        assert!(run.nodes.iter().all(|n| n.state == NodeState::Released));

        let result = run.result.unwrap();
        assert_eq!(result.reporting_nodes, 3);
        assert_eq!(result.completed_requests, 27);
        assert_eq!(result.failed_requests, 3);

        // Start time is 1.5s per configured node after scheduling
        let scheduled = run.scheduled_at.unwrap();
        let started = run.started_at.unwrap();
        assert!(scheduled - started >= chrono::Duration::milliseconds(4500));

        assert_eq!(
            harness.statuses(),
            vec![
                RunStatus::Provisioning,
                RunStatus::Configuring,
                RunStatus::Scheduling,
                RunStatus::Running,
                RunStatus::Collecting,
                RunStatus::Completed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_configure_failure_is_tolerated() {
        let mut harness = Harness::new();
        let mut provisioner = provisioner_delivering(4);
        provisioner.expect_destroy_nodes().returning(|_| Ok(()));

        let mut agent = MockAgent::new();
        agent.expect_configure().returning(|node| {
            if node.instance_id == "i-2" {
                Err(CollaboratorError::Unavailable("ssh refused".to_string()))
            } else {
                Ok(())
            }
        });
        agent
            .expect_schedule()
            .times(3)
            .returning(|_, _, _, _| Ok(()));
        agent
            .expect_collect()
            .times(3)
            .returning(|_| Ok(node_result(20.0)));

        let run = harness.manager(4, provisioner, agent).run().await;
        assert_eq!(run.status, RunStatus::Completed);

        let result = run.result.unwrap();
        assert_eq!(result.reporting_nodes, 3);
        assert_eq!(result.completed_requests, 27);
        // 3 reported failures plus the unreachable node's full request count
        assert_eq!(result.failed_requests, 3 + REQUESTS_PER_NODE);
        assert_eq!(harness.admission.available(), 32);
        assert_eq!(harness.statuses().last(), Some(&RunStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_configure_failures_fail_the_run() {
        let mut harness = Harness::new();
        let mut provisioner = provisioner_delivering(4);
        provisioner
            .expect_destroy_nodes()
            .withf(|nodes| nodes.len() == 4)
            .times(1)
            .returning(|_| Ok(()));

        let mut agent = MockAgent::new();
        agent
            .expect_configure()
            .returning(|_| Err(CollaboratorError::Rejected("bad image".to_string())));
        agent.expect_schedule().never();
        agent.expect_collect().never();

        let before = harness.admission.available();
        let run = harness.manager(4, provisioner, agent).run().await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.result.is_none());
        assert_eq!(harness.admission.available(), before);

        let statuses = harness.statuses();
        assert_eq!(statuses.last(), Some(&RunStatus::Failed));
        assert_eq!(
            statuses.iter().filter(|s| **s == RunStatus::Failed).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_provisioning_releases_delivered_nodes() {
        let mut harness = Harness::new();
        let mut provisioner = provisioner_delivering(2);
        provisioner
            .expect_destroy_nodes()
            .withf(|nodes| nodes.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let mut agent = MockAgent::new();
        agent.expect_configure().never();

        let run = harness.manager(3, provisioner, agent).run().await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(harness.admission.available(), 32);
        assert_eq!(
            harness.statuses(),
            vec![RunStatus::Provisioning, RunStatus::Failed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_error_fails_without_release_call() {
        let harness = Harness::new();
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_create_nodes()
            .returning(|_| Err(CollaboratorError::Rejected("quota exceeded".to_string())));
        provisioner.expect_destroy_nodes().never();

        let run = harness.manager(2, provisioner, MockAgent::new()).run().await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(harness.admission.available(), 32);

        let record = harness.recorder.get(RunId(1)).unwrap();
        assert!(record
            .failure_reason
            .unwrap()
            .contains("quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_timeout_counts_node_as_unreachable() {
        let harness = Harness::new();
        let mut provisioner = provisioner_delivering(2);
        provisioner.expect_destroy_nodes().returning(|_| Ok(()));

        let mut agent = MockAgent::new();
        agent.expect_configure().returning(|_| Ok(()));
        agent.expect_schedule().returning(|_, _, _, _| Ok(()));
        agent.expect_collect().returning(|node| {
            if node.instance_id == "i-0" {
                Err(CollaboratorError::Timeout(Duration::from_secs(30)))
            } else {
                Ok(node_result(40.0))
            }
        });

        let run = harness.manager(2, provisioner, agent).run().await;
        assert_eq!(run.status, RunStatus::Completed);
        let result = run.result.unwrap();
        assert_eq!(result.reporting_nodes, 1);
        assert_eq!(result.mean_time, 40.0);
        assert_eq!(result.failed_requests, 1 + REQUESTS_PER_NODE);
        assert_eq!(run.nodes[0].state, NodeState::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_results_fails_the_run() {
        let harness = Harness::new();
        let mut provisioner = provisioner_delivering(2);
        provisioner.expect_destroy_nodes().returning(|_| Ok(()));

        let mut agent = MockAgent::new();
        agent.expect_configure().returning(|_| Ok(()));
        agent.expect_schedule().returning(|_, _, _, _| Ok(()));
        agent
            .expect_collect()
            .returning(|_| Err(CollaboratorError::Unavailable("agent gone".to_string())));

        let run = harness.manager(2, provisioner, agent).run().await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(harness.admission.available(), 32);

        let reason = harness.recorder.get(RunId(1)).unwrap().failure_reason.unwrap();
        assert_eq!(reason, "No surviving nodes after collecting");
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_request_counts_saturate_instead_of_overflowing() {
        let harness = Harness::new();
        let mut provisioner = provisioner_delivering(2);
        provisioner.expect_destroy_nodes().returning(|_| Ok(()));

        let mut agent = MockAgent::new();
        agent.expect_configure().returning(|node| {
            if node.instance_id == "i-0" {
                Err(CollaboratorError::Rejected("agent install failed".to_string()))
            } else {
                Ok(())
            }
        });
        agent.expect_schedule().returning(|_, _, _, _| Ok(()));
        agent.expect_collect().returning(|_| Ok(node_result(20.0)));

        let run = harness
            .manager_with_requests(2, u64::MAX, provisioner, agent)
            .run()
            .await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.result.unwrap().failed_requests, u64::MAX);
        assert_eq!(harness.admission.available(), 32);
    }

    #[test]
    fn test_shared_start_time() {
        let now = Utc::now();
        assert_eq!(
            shared_start_time(now, Duration::from_millis(1500), 3),
            now + chrono::Duration::milliseconds(4500)
        );
        assert_eq!(shared_start_time(now, Duration::from_millis(1500), 0), now);
        assert_eq!(
            shared_start_time(now, Duration::MAX, 4),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_retried_and_never_blocks_slots() {
        let harness = Harness::new();
        let mut provisioner = provisioner_delivering(1);
        provisioner
            .expect_destroy_nodes()
            .times(2)
            .returning(|_| Err(CollaboratorError::Unavailable("api down".to_string())));

        let run = harness.manager(1, provisioner, healthy_agent()).run().await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.nodes[0].state, NodeState::Collected);
        assert_eq!(harness.admission.available(), 32);
    }
}
