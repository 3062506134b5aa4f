//! Admission control and node lifecycle orchestration
//!
//! Benchmark requests arrive through the [`EventBridge`], wait in a strict
//! FIFO [`AdmissionQueue`] until the [`CapacityLedger`] can reserve their
//! node slots, and are then driven to completion by one
//! [`NodeLifecycleManager`] task each. Every status change flows through the
//! [`ProgressRecorder`] to the outbound [`Notifier`].

pub mod admission;
pub mod bridge;
pub mod collaborators;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod progress;
pub mod queue;
pub mod simulated;

// Re-export commonly used types
pub use admission::{AdmissionControl, SlotReservation};
pub use bridge::{BridgeEvent, BridgeHandle, EventBridge};
pub use collaborators::{ChannelNotifier, NodeAgent, Notifier, Provisioner};
pub use error::{CollaboratorError, EmptyQueueError, ExecutionError, NotifyError};
pub use ledger::CapacityLedger;
pub use lifecycle::NodeLifecycleManager;
pub use progress::{ProgressRecorder, RunRecord};
pub use queue::{AdmissionQueue, QueueEntry};
pub use simulated::{SimulatedAgent, SimulatedProvisioner, SimulationConfig};
