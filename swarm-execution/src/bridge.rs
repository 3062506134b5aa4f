//! Event bridge: the single dispatcher loop between the bus and the core
//!
//! All inbound messages and all slot releases funnel through one channel and
//! are handled one at a time. Every event that can change what the queue
//! head sees (a new request, released slots) is followed by an admission
//! pass, and each admitted run gets its own supervised lifecycle task.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use swarm_config::LifecycleConfig;
use swarm_core::{BenchmarkRequest, RunId, RunStatus};
use swarm_ipc::InboundMessage;
use swarm_resilience::{ShutdownCoordinator, ShutdownSignal};

use crate::admission::{AdmissionControl, SlotReservation};
use crate::collaborators::{NodeAgent, Notifier, Provisioner};
use crate::error::ExecutionError;
use crate::lifecycle::NodeLifecycleManager;
use crate::progress::ProgressRecorder;
use crate::queue::QueueEntry;

/// Everything the dispatcher loop reacts to
#[derive(Debug)]
pub enum BridgeEvent {
    /// Undecoded line from the inbound transport
    Line(String),
    Message(InboundMessage),
    /// A run gave its slots back
    SlotsReleased { run_id: RunId, slots: usize },
}

/// Cloneable sender into a running [`EventBridge`]
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeHandle {
    /// Queue a raw inbound line. Returns false once the bridge has stopped.
    pub fn submit_line(&self, line: impl Into<String>) -> bool {
        self.events.send(BridgeEvent::Line(line.into())).is_ok()
    }

    pub fn submit(&self, message: InboundMessage) -> bool {
        self.events.send(BridgeEvent::Message(message)).is_ok()
    }
}

pub struct EventBridge {
    admission: Arc<AdmissionControl>,
    recorder: Arc<ProgressRecorder>,
    notifier: Arc<dyn Notifier>,
    provisioner: Arc<dyn Provisioner>,
    agent: Arc<dyn NodeAgent>,
    lifecycle: LifecycleConfig,
    shutdown: Arc<ShutdownCoordinator>,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    events_rx: mpsc::UnboundedReceiver<BridgeEvent>,
    draining: bool,
}

impl EventBridge {
    pub fn new(
        max_slots: usize,
        lifecycle: LifecycleConfig,
        provisioner: Arc<dyn Provisioner>,
        agent: Arc<dyn NodeAgent>,
        notifier: Arc<dyn Notifier>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            admission: Arc::new(AdmissionControl::new(max_slots)),
            recorder: Arc::new(ProgressRecorder::new(notifier.clone())),
            notifier,
            provisioner,
            agent,
            lifecycle,
            shutdown,
            events_tx,
            events_rx,
            draining: false,
        }
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn admission(&self) -> Arc<AdmissionControl> {
        self.admission.clone()
    }

    pub fn recorder(&self) -> Arc<ProgressRecorder> {
        self.recorder.clone()
    }

    /// Dispatch events until shutdown.
    ///
    /// A graceful shutdown stops intake and keeps admitting until the queue
    /// is empty. Any harsher signal fails whatever is still queued and stops.
    pub async fn run(mut self) {
        let _task = self.shutdown.track_task();
        let mut shutdown_rx = self.shutdown.subscribe();
        info!(
            max_slots = self.admission.max_slots(),
            "Event bridge started"
        );

        loop {
            if self.draining && self.admission.queued() == 0 {
                break;
            }

            tokio::select! {
                Some(event) = self.events_rx.recv() => self.dispatch(event),
                signal = shutdown_rx.recv() => match signal {
                    Ok(ShutdownSignal::Graceful) => {
                        info!(queued = self.admission.queued(), "Draining admission queue before shutdown");
                        self.draining = true;
                    }
                    Ok(signal) => {
                        warn!(%signal, "Shutdown escalated, abandoning queued runs");
                        self.abandon_queue();
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        self.abandon_queue();
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        info!("Event bridge stopped");
    }

    fn dispatch(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Line(line) => match InboundMessage::parse(&line) {
                Ok(message) => self.handle_message(message),
                Err(e) => warn!("Dropping malformed inbound message: {}", e),
            },
            BridgeEvent::Message(message) => self.handle_message(message),
            BridgeEvent::SlotsReleased { run_id, slots } => {
                debug!(run_id = %run_id, slots, "Slots released");
                self.admit_pending();
            }
        }
    }

    fn handle_message(&mut self, message: InboundMessage) {
        debug!(channel = message.channel(), "Inbound message");
        match message {
            InboundMessage::BenchmarkNew {
                id,
                domain,
                num_servers,
                num_requests,
            } => {
                let request = BenchmarkRequest::new(id, domain, num_servers, num_requests);
                match self.accept(request) {
                    Ok(()) => {}
                    Err(ExecutionError::DuplicateRun(run_id)) => {
                        warn!(run_id = %run_id, "Ignoring duplicate benchmark request");
                    }
                    Err(e) => {
                        warn!(run_id = id, "Rejecting benchmark request: {}", e);
                        self.recorder
                            .record_failure(RunId(id), Utc::now(), e.to_string());
                    }
                }
            }
            InboundMessage::NodeReleased {
                run_id,
                num_servers,
            } => self.node_released(RunId(run_id), num_servers),
        }
    }

    fn accept(&mut self, request: BenchmarkRequest) -> Result<(), ExecutionError> {
        let run_id = request.id;
        if self.recorder.get(run_id).is_some() {
            return Err(ExecutionError::DuplicateRun(run_id));
        }
        if self.draining {
            return Err(ExecutionError::ShuttingDown);
        }
        request.validate(self.admission.max_slots())?;

        self.recorder
            .record(run_id, RunStatus::Pending, request.created_at);
        let position = self.admission.enqueue(request);
        info!(run_id = %run_id, position, "Benchmark queued");

        self.admit_pending();
        Ok(())
    }

    /// Nodes of a run were reaped outside its manager
    fn node_released(&mut self, run_id: RunId, num_servers: usize) {
        let freed = self.admission.release_run(run_id);
        if freed == 0 {
            debug!(run_id = %run_id, "No reservation held for released run");
        } else if freed != num_servers {
            warn!(
                run_id = %run_id,
                reported = num_servers,
                held = freed,
                "Release notice disagrees with reservation, released what was held"
            );
        } else {
            info!(run_id = %run_id, slots = freed, "Released slots out of band");
        }
        self.admit_pending();
    }

    fn admit_pending(&mut self) {
        for entry in self.admission.admit_ready() {
            self.spawn_run(entry);
        }
    }

    /// Start a lifecycle manager for `entry` under a supervisor task
    fn spawn_run(&self, entry: QueueEntry) {
        let run_id = entry.request.id;
        let reservation = SlotReservation::new(self.admission.clone(), run_id)
            .with_events(self.events_tx.clone());
        let manager = NodeLifecycleManager::new(
            entry.request,
            reservation,
            self.provisioner.clone(),
            self.agent.clone(),
            self.recorder.clone(),
            self.notifier.clone(),
            self.lifecycle.clone(),
        );

        let recorder = self.recorder.clone();
        let task = self.shutdown.track_task();
        let handle = tokio::spawn(manager.run());

        tokio::spawn(async move {
            let _task = task;
            let problem = match handle.await {
                Ok(run) if run.status.is_terminal() => None,
                Ok(run) => Some(format!("lifecycle manager stopped while {}", run.status)),
                Err(e) if e.is_panic() => Some("lifecycle manager panicked".to_string()),
                Err(_) => Some("lifecycle manager was cancelled".to_string()),
            };

            if let Some(reason) = problem {
                error!(run_id = %run_id, "{}", reason);
                recorder.record_failure(run_id, Utc::now(), reason);
            }
        });
    }

    /// Fail every queued run
    fn abandon_queue(&mut self) {
        for entry in self.admission.drain_queue() {
            self.recorder.record_failure(
                entry.request.id,
                Utc::now(),
                ExecutionError::ShuttingDown.to_string(),
            );
        }
    }
}
