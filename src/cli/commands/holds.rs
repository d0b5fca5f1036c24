use anyhow::Result;
use chrono::Utc;

use super::{notification_gate, open_store, Command};
use crate::config::WorkflowConfig;
use crate::notify::{send_hold_reminders, send_hold_summary};

pub struct HoldRemindersCommand {
    config: WorkflowConfig,
}

impl HoldRemindersCommand {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }
}

impl Command for HoldRemindersCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let report = send_hold_reminders(&store, &notification_gate(&self.config), Utc::now()).await?;
        store.close().await;
        println!(
            "⏰ Hold reminders: {} reminded, {} escalated",
            report.reminded, report.escalated
        );
        Ok(())
    }
}

pub struct HoldSummaryCommand {
    config: WorkflowConfig,
}

impl HoldSummaryCommand {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }
}

impl Command for HoldSummaryCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let sent = send_hold_summary(&store, &notification_gate(&self.config)).await?;
        store.close().await;
        if sent == 0 {
            println!("📭 No orders awaiting reconfirmation");
        } else {
            println!("📨 Hold summary sent for {sent} order(s)");
        }
        Ok(())
    }
}
