use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::Path;
use std::time::Duration;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::serve::ServeOptions;
use swarm_config::{ConfigLoader, SwarmConfig};
use swarm_execution::SimulationConfig;
use swarm_logging::{init_logging_from_config, init_simple_tracing};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run(cli));

    // A stdin read parked on an interactive terminal never returns
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_simple_tracing("info")?;
            tracing::error!("{:#}", e);
            return Err(e);
        }
    };

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    init_logging_from_config(&config.logging)?;

    match cli.command {
        Some(Commands::Serve {
            max_slots,
            setup_margin_ms,
            failure_rate,
            latency_ms,
        }) => {
            let options = ServeOptions {
                max_slots,
                setup_margin_ms,
                simulation: SimulationConfig {
                    latency: Duration::from_millis(latency_ms),
                    failure_rate,
                },
            };
            commands::serve::run(config, options).await
        }
        Some(Commands::Config { config_cmd }) => commands::config::handle(&config_cmd, &config),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Load configuration from file and `SWARM_*` environment variables
fn load_config(config_path: Option<&Path>) -> Result<SwarmConfig> {
    ConfigLoader::new()
        .load(config_path)
        .with_context(|| match config_path {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration from environment".to_string(),
        })
}
