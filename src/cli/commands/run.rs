use anyhow::Result;

use super::{with_runner, Command};
use crate::config::WorkflowConfig;

pub struct RunCommand {
    config: WorkflowConfig,
}

impl RunCommand {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let summary = with_runner(&self.config, |runner| async move {
            Ok::<_, anyhow::Error>(runner.run().await?)
        })
        .await?;

        println!("✅ Run {} finished", summary.run_id);
        println!(
            "   📋 eligible={} processed={} held={} failed={}",
            summary.counts.eligible, summary.counts.processed, summary.counts.held, summary.counts.failed
        );
        let reconciliation = &summary.reconciliation;
        println!(
            "   🔁 reconciliation: parked={} propagated={} released={} manual={} errors={}",
            reconciliation.drift_held,
            reconciliation.propagated,
            reconciliation.released,
            reconciliation.manual_required,
            reconciliation.errors
        );
        if !summary.created_items.is_empty() {
            println!(
                "   🏷️  created items: {} (price codes {})",
                summary.created_items.join(", "),
                if summary.price_codes_applied { "applied" } else { "not applied" }
            );
        }
        Ok(())
    }
}
