use anyhow::Result;

use super::{open_store, with_runner, Command};
use crate::config::WorkflowConfig;
use crate::runner::QueueOutcome;

pub struct QueueCommand {
    config: WorkflowConfig,
    order: i64,
}

impl QueueCommand {
    pub fn new(config: WorkflowConfig, order: i64) -> Self {
        Self { config, order }
    }
}

impl Command for QueueCommand {
    async fn execute(&self) -> Result<()> {
        let order = self.order;
        let outcome = with_runner(&self.config, |runner| async move {
            Ok::<_, anyhow::Error>(runner.queue_order(order).await?)
        })
        .await?;
        match outcome {
            QueueOutcome::Queued => println!("✅ Order {order} queued for the next run"),
            QueueOutcome::NotEligible => {
                println!("⚠️  Order {order} is not a valid LWS order (plant 4, source LWS, product group P4-LWS)")
            }
            QueueOutcome::Removed => println!("🚫 Order {order} was removed; retry it to bring it back first"),
            QueueOutcome::Reconciling => {
                println!("⏸️  Order {order} is waiting on reconciliation and cannot be queued")
            }
        }
        Ok(())
    }
}

pub struct RetryCommand {
    config: WorkflowConfig,
    order: i64,
}

impl RetryCommand {
    pub fn new(config: WorkflowConfig, order: i64) -> Self {
        Self { config, order }
    }
}

impl Command for RetryCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let reset = store.reset_order(self.order).await?;
        store.close().await;
        if reset {
            println!("🔄 Order {} reset; the next run starts it from ELIGIBLE", self.order);
        } else {
            println!("❓ Order {} is not known locally", self.order);
        }
        Ok(())
    }
}

pub struct RemoveCommand {
    config: WorkflowConfig,
    order: i64,
}

impl RemoveCommand {
    pub fn new(config: WorkflowConfig, order: i64) -> Self {
        Self { config, order }
    }
}

impl Command for RemoveCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        store.remove_order(self.order).await?;
        store.close().await;
        println!("🗑️  Order {} removed from processing", self.order);
        Ok(())
    }
}

pub struct StatusCommand {
    config: WorkflowConfig,
    order: i64,
}

impl StatusCommand {
    pub fn new(config: WorkflowConfig, order: i64) -> Self {
        Self { config, order }
    }
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let Some(order) = store.order(self.order).await? else {
            store.close().await;
            println!("❓ Order {} is not known locally", self.order);
            return Ok(());
        };
        let mappings = store.po_mappings(self.order).await?;
        let changes = store.change_log(self.order).await?;
        store.close().await;

        println!("📦 ORDER {}", order.order_id);
        println!("──────────────");
        println!("   status:      {}", order.status);
        println!("   last step:   {}", order.last_step);
        println!("   last run:    {}", show(order.last_run_id.as_deref()));
        if let Some(summary) = &order.last_error_summary {
            println!("   last error:  {summary}");
        }
        if let Some(since) = order.hold_since {
            println!("   held since:  {}", since.to_rfc3339());
        }
        println!();
        println!("🔗 ARTIFACTS:");
        println!("   base item:        {}", show(order.ids.base_item_code.as_deref()));
        println!("   site-A job:       {}", show(order.ids.job_site_a.as_deref()));
        println!("   purchase order:   {}", show(order.ids.po_number));
        println!("   site-B order:     {}", show(order.ids.sales_order_site_b));
        println!("   shipping request: {}", show(order.ids.shipping_request.as_deref()));
        println!("   site-B job:       {}", show(order.ids.job_site_b.as_deref()));

        if !mappings.is_empty() {
            println!();
            println!("🧾 PO MAPPINGS:");
            for mapping in &mappings {
                println!(
                    "   {} → PO {} line {} / SO {} / SR {}",
                    mapping.item_code,
                    mapping.po_number,
                    mapping.po_line,
                    show(mapping.sales_order_site_b),
                    show(mapping.shipping_request.as_deref())
                );
            }
        }

        if !changes.is_empty() {
            println!();
            println!("📝 CHANGES:");
            for change in &changes {
                println!(
                    "   {}: {} → {}",
                    change.field,
                    show(change.old_value.as_deref()),
                    show(change.new_value.as_deref())
                );
            }
        }
        Ok(())
    }
}
