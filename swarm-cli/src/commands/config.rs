//! `swarm config` subcommands

use anyhow::{bail, Context, Result};
use std::path::Path;

use swarm_config::{ConfigLoader, SwarmConfig};

use crate::cli::ConfigCommands;

pub fn handle(command: &ConfigCommands, effective: &SwarmConfig) -> Result<()> {
    match command {
        ConfigCommands::Validate { config_file } => {
            validate(config_file)?;
            println!("Configuration is valid: {}", config_file.display());
            Ok(())
        }
        ConfigCommands::Generate { output, force } => match output {
            Some(path) => {
                generate(path, *force)?;
                println!("Sample configuration written to {}", path.display());
                Ok(())
            }
            None => {
                print!("{}", SwarmConfig::generate_sample());
                Ok(())
            }
        },
        ConfigCommands::Show { format } => {
            println!("{}", render(effective, format)?);
            Ok(())
        }
    }
}

pub fn validate(path: &Path) -> Result<SwarmConfig> {
    ConfigLoader::new()
        .from_file(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

pub fn generate(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite",
            path.display()
        );
    }
    std::fs::write(path, SwarmConfig::generate_sample())
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn render(config: &SwarmConfig, format: &str) -> Result<String> {
    match format {
        "yaml" => Ok(serde_yaml::to_string(config)?),
        "json" => Ok(serde_json::to_string_pretty(config)?),
        other => bail!("Unsupported format '{}', expected yaml or json", other),
    }
}
