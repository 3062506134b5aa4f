//! `swarm serve`: stdin requests in, stdout notifications out

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use swarm_config::SwarmConfig;
use swarm_execution::{
    ChannelNotifier, EventBridge, SimulatedAgent, SimulatedProvisioner, SimulationConfig,
};
use swarm_ipc::{LineReader, LineWriter, MessageEnvelope};
use swarm_resilience::ShutdownCoordinator;

/// How long buffered notifications may take to flush after shutdown
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub max_slots: Option<usize>,
    pub setup_margin_ms: Option<u64>,
    pub simulation: SimulationConfig,
}

impl ServeOptions {
    /// Fold command line overrides into the loaded configuration
    pub fn apply(&self, config: &mut SwarmConfig) {
        if let Some(max_slots) = self.max_slots {
            config.admission.max_slots = max_slots;
        }
        if let Some(ms) = self.setup_margin_ms {
            config.lifecycle.setup_margin = Duration::from_millis(ms);
        }
    }
}

pub async fn run(mut config: SwarmConfig, options: ServeOptions) -> Result<()> {
    options.apply(&mut config);
    config
        .validate_all()
        .context("Effective configuration is invalid")?;

    info!(
        max_slots = config.admission.max_slots,
        setup_margin_ms = config.lifecycle.setup_margin.as_millis() as u64,
        failure_rate = options.simulation.failure_rate,
        "Starting swarm coordinator"
    );

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let (notifier, mut notifications) = ChannelNotifier::new();

    let bridge = EventBridge::new(
        config.admission.max_slots,
        config.lifecycle.clone(),
        Arc::new(SimulatedProvisioner::new(options.simulation.clone())),
        Arc::new(SimulatedAgent::new(options.simulation.clone())),
        Arc::new(notifier),
        shutdown.clone(),
    );
    let handle = bridge.handle();
    let bridge_task = tokio::spawn(bridge.run());

    // Ends once every notifier clone is dropped, i.e. the bridge and all managers are gone
    let writer_task = tokio::spawn(async move {
        let mut writer = LineWriter::stdout();
        while let Some(notification) = notifications.recv().await {
            if let Err(e) = writer.send(&MessageEnvelope::new(notification)).await {
                error!("Failed to write notification: {}", e);
                break;
            }
        }
    });

    let mut reader = LineReader::stdin();
    loop {
        tokio::select! {
            line = reader.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle.submit_line(line) {
                        warn!("Event bridge stopped, no longer reading input");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Input closed, draining queued benchmarks");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }
    drop(handle);

    let outcome = shutdown.shutdown().await;
    bridge_task.await.context("Event bridge task failed")?;

    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer_task)
        .await
        .is_err()
    {
        warn!("Notification writer did not finish, pending notifications dropped");
    }

    outcome.context("Shutdown did not complete cleanly")?;
    info!("Swarm coordinator stopped");
    Ok(())
}
