use anyhow::Result;
use clap::Parser;

use lws_fulfillment::cli::commands::holds::{HoldRemindersCommand, HoldSummaryCommand};
use lws_fulfillment::cli::commands::housekeeping::{ArchiveCommand, ConfigCommand};
use lws_fulfillment::cli::commands::orders::{QueueCommand, RemoveCommand, RetryCommand, StatusCommand};
use lws_fulfillment::cli::commands::run::RunCommand;
use lws_fulfillment::cli::commands::Command;
use lws_fulfillment::cli::{Cli, Commands};
use lws_fulfillment::{init_telemetry, WorkflowConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    WorkflowConfig::load_env_file()?;
    let config = WorkflowConfig::load_from(&cli.config)?;
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            Commands::Run => RunCommand::new(config).execute().await,
            Commands::Queue { order } => QueueCommand::new(config, order).execute().await,
            Commands::Retry { order } => RetryCommand::new(config, order).execute().await,
            Commands::Remove { order } => RemoveCommand::new(config, order).execute().await,
            Commands::Status { order } => StatusCommand::new(config, order).execute().await,
            Commands::HoldReminders => HoldRemindersCommand::new(config).execute().await,
            Commands::HoldSummary => HoldSummaryCommand::new(config).execute().await,
            Commands::Archive => ArchiveCommand::new(config).execute().await,
            Commands::Config { output } => ConfigCommand::new(config, output).execute().await,
        }
    })
}
