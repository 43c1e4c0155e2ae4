mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, DlqCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = geofence_config::load()?;

    match cli.command {
        Command::Ingest => commands::run_pipeline(config, false).await,
        Command::Processor => commands::run_pipeline(config, false).await,
        Command::Delivery => commands::run_delivery(config).await,
        Command::AllInOne => commands::run_pipeline(config, true).await,
        Command::Dlq { command: DlqCommand::Replay { id } } => commands::dlq_replay(config, id).await,
        Command::Dlq { command: DlqCommand::List { origin, limit } } => {
            commands::dlq_list(config, origin, limit).await
        }
    }
}
