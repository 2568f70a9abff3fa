//! approvald - approval workflow daemon
//!
//! - Installs workflow definitions from a JSON file
//! - Escalates overdue step assignments on a fixed interval
//! - Reports notifications and resolutions as structured log events

use approval_daemon::{read_workflow_file, Daemon, DaemonConfig, DaemonError, DaemonResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// approvald CLI
#[derive(Parser)]
#[command(name = "approvald")]
#[command(about = "Approval workflow daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "APPROVALD_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "APPROVALD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "APPROVALD_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (default)
    Run,

    /// Check a workflow definition file without starting the daemon
    Validate {
        /// JSON file with an array of workflow definitions
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Validate { file } => {
            let definitions = read_workflow_file(&file)?;
            for definition in &definitions {
                println!(
                    "ok  {}  {} ({}, {} steps)",
                    definition.id,
                    definition.name,
                    definition.entity_type,
                    definition.steps.len()
                );
            }
            println!("{} workflow definition(s) valid", definitions.len());
            Ok(())
        }
        Command::Run => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting approvald");
            let daemon = Daemon::new(config).await?;
            daemon.run().await
        }
    }
}
