//! Graceful shutdown coordination
//!
//! The coordinator broadcasts escalating shutdown signals and waits for
//! tracked tasks to finish. Tasks are tracked with a [`TaskGuard`] that
//! unregisters itself when dropped, so a task that panics or is aborted
//! never keeps shutdown waiting.

use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

/// Shutdown signal types with escalating urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Stop accepting new work, let current tasks complete
    Graceful,
    /// Current tasks are taking too long
    Urgent,
    /// Abandon whatever is still running
    Forced,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
            ShutdownSignal::Forced => write!(f, "forced"),
        }
    }
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<ShutdownSignal>,
    is_shutting_down: AtomicBool,
    active_tasks: watch::Sender<u32>,
    graceful_timeout: Duration,
    urgent_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(30), Duration::from_secs(10))
    }

    pub fn with_timeouts(graceful_timeout: Duration, urgent_timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(16);
        let (active_tasks, _) = watch::channel(0);

        Self {
            sender,
            is_shutting_down: AtomicBool::new(false),
            active_tasks,
            graceful_timeout,
            urgent_timeout,
        }
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.sender.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Register a running task. The task counts as active until the guard drops.
    pub fn track_task(&self) -> TaskGuard {
        self.active_tasks.send_modify(|count| *count += 1);
        TaskGuard {
            active_tasks: self.active_tasks.clone(),
        }
    }

    pub fn active_task_count(&self) -> u32 {
        *self.active_tasks.borrow()
    }

    /// Initiate shutdown, escalating from graceful to urgent to forced
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        if self.is_shutting_down.swap(true, Ordering::SeqCst) {
            return Err(ShutdownError::AlreadyShuttingDown);
        }

        info!(
            "Starting graceful shutdown with {} active tasks",
            self.active_task_count()
        );

        self.broadcast(ShutdownSignal::Graceful);
        if self.wait_for_tasks(self.graceful_timeout).await {
            info!("Graceful shutdown completed successfully");
            return Ok(());
        }

        warn!("Graceful shutdown timeout, escalating to urgent shutdown");
        self.broadcast(ShutdownSignal::Urgent);
        if self.wait_for_tasks(self.urgent_timeout).await {
            info!("Urgent shutdown completed");
            return Ok(());
        }

        error!("Urgent shutdown timeout, forcing shutdown");
        self.broadcast(ShutdownSignal::Forced);

        // Give forced cancellations a moment to take effect
        if self.wait_for_tasks(Duration::from_millis(500)).await {
            info!("Forced shutdown completed successfully");
            return Ok(());
        }

        let remaining = self.active_task_count();
        warn!(
            "Forced shutdown completed with {} tasks still active",
            remaining
        );
        Err(ShutdownError::TasksRemaining(remaining))
    }

    fn broadcast(&self, signal: ShutdownSignal) {
        // No subscribers simply means nobody needs telling
        if self.sender.send(signal).is_err() {
            info!("No listeners for {} shutdown signal", signal);
        }
    }

    /// Wait for all tasks to complete within the given timeout
    async fn wait_for_tasks(&self, timeout_duration: Duration) -> bool {
        let mut receiver = self.active_tasks.subscribe();
        let drained = matches!(
            timeout(timeout_duration, receiver.wait_for(|count| *count == 0)).await,
            Ok(Ok(_))
        );
        drained
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one tracked task as active for as long as it lives
#[derive(Debug)]
pub struct TaskGuard {
    active_tasks: watch::Sender<u32>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active_tasks
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Shutdown error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Shutdown already in progress
    #[error("Shutdown already in progress")]
    AlreadyShuttingDown,

    /// Tasks remaining after forced shutdown
    #[error("Forced shutdown completed with {0} tasks still active")]
    TasksRemaining(u32),
}
