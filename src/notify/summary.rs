use tracing::{info, warn};

use super::gate::NotificationGate;
use super::templates;
use crate::store::{OrderState, OrderStatus, StateStore, StoreError};

/// Hold steps reported in the daily summary besides every `P2_` step
pub const SUMMARY_STEPS: &[&str] = &["SO4_QTY_CHANGED_WAIT_RECONFIRM"];

fn in_summary(order: &OrderState) -> bool {
    SUMMARY_STEPS.contains(&order.last_step.as_str()) || order.last_step.starts_with("P2_")
}

/// Mail the reconfirmation backlog to fulfillment; nothing is sent when it is empty
pub async fn send_hold_summary(store: &StateStore, gate: &NotificationGate) -> Result<usize, StoreError> {
    let orders: Vec<OrderState> = store
        .orders_in(OrderStatus::Hold, &[])
        .await?
        .into_iter()
        .filter(in_summary)
        .collect();

    if orders.is_empty() {
        info!("No reconfirmation holds; daily summary skipped");
        return Ok(0);
    }

    let rendered = templates::hold_summary(&orders);
    match gate.deliver(&gate.recipients().fulfillment, rendered).await {
        Ok(()) => {
            info!(count = orders.len(), "Sent daily hold summary");
            Ok(orders.len())
        }
        Err(e) => {
            warn!(error = %e, "Daily hold summary not delivered");
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::notify::MockNotifier;
    use crate::store::OrderUpdate;
    use std::sync::Arc;

    fn gate(notifier: MockNotifier) -> NotificationGate {
        let config = NotificationConfig {
            fulfillment: vec!["fulfillment@example.com".to_string()],
            ..NotificationConfig::default()
        };
        NotificationGate::new(Arc::new(notifier), &config)
    }

    #[tokio::test]
    async fn test_summary_lists_reconfirmation_holds_only() {
        let store = StateStore::in_memory().await.unwrap();
        for (order, step) in [
            (1001, "SO4_QTY_CHANGED_WAIT_RECONFIRM"),
            (1002, "P2_SO_QTY_UPDATED_WAIT_RECONFIRM"),
            (1003, "ITEM_CREATE_WAIT"),
        ] {
            store
                .record_progress(&OrderUpdate::new(order, OrderStatus::Hold, step))
                .await
                .unwrap();
        }

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|n| {
                n.recipients == ["fulfillment@example.com"]
                    && n.html_body.contains("1001")
                    && n.html_body.contains("1002")
                    && !n.html_body.contains("1003")
            })
            .times(1)
            .returning(|_| Ok(()));

        assert_eq!(send_hold_summary(&store, &gate(notifier)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_summary_is_not_sent() {
        let store = StateStore::in_memory().await.unwrap();
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        assert_eq!(send_hold_summary(&store, &gate(notifier)).await.unwrap(), 0);
    }
}
