//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swarm_config::domains::logging::{LogFormat, LogLevel};

#[derive(Parser)]
#[command(author, version, about = "Benchmark swarm coordinator", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Override the configured log format
    #[arg(long, value_name = "FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the coordinator: requests on stdin, notifications on stdout
    Serve {
        /// Total node slots (overrides admission.max_slots)
        #[arg(long, value_name = "COUNT")]
        max_slots: Option<usize>,

        /// Per-node setup estimate in milliseconds (overrides lifecycle.setup_margin_ms)
        #[arg(long, value_name = "MS")]
        setup_margin_ms: Option<u64>,

        /// Probability that a simulated per-node call fails
        #[arg(long, value_name = "RATE", default_value_t = 0.0)]
        failure_rate: f64,

        /// Latency of every simulated provisioner and agent call
        #[arg(long, value_name = "MS", default_value_t = 50)]
        latency_ms: u64,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path, stdout when omitted
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "swarm",
            "--log-level",
            "debug",
            "serve",
            "--max-slots",
            "8",
            "--failure-rate",
            "0.25",
        ])
        .unwrap();

        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        match cli.command {
            Some(Commands::Serve {
                max_slots,
                setup_margin_ms,
                failure_rate,
                latency_ms,
            }) => {
                assert_eq!(max_slots, Some(8));
                assert_eq!(setup_margin_ms, None);
                assert_eq!(failure_rate, 0.25);
                assert_eq!(latency_ms, 50);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "swarm",
            "config",
            "show",
            "--log-format",
            "json",
            "--config",
            "swarm.yaml",
        ])
        .unwrap();

        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.config, Some(PathBuf::from("swarm.yaml")));
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["swarm", "--log-level", "loud", "serve"]).is_err());
    }
}
