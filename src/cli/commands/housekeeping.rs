use anyhow::Result;
use chrono::{Duration, Utc};
use std::path::PathBuf;

use super::{open_store, Command};
use crate::config::WorkflowConfig;

pub struct ArchiveCommand {
    config: WorkflowConfig,
}

impl ArchiveCommand {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }
}

impl Command for ArchiveCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let cutoff = Utc::now() - Duration::days(self.config.workflow.archive_after_days);
        let moved = store.archive_completed(cutoff).await?;
        store.close().await;
        println!(
            "🗄️  Archived {moved} completed order(s) older than {} days",
            self.config.workflow.archive_after_days
        );
        Ok(())
    }
}

pub struct ConfigCommand {
    config: WorkflowConfig,
    output: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(config: WorkflowConfig, output: Option<PathBuf>) -> Self {
        Self { config, output }
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        match &self.output {
            Some(path) => {
                self.config.save_to_file(path)?;
                println!("💾 Configuration written to {}", path.display());
            }
            None => print!("{}", toml::to_string_pretty(&self.config)?),
        }
        Ok(())
    }
}
