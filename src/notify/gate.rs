use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::signature::{failure_signature, substrate_signature};
use super::templates::{self, Rendered};
use super::{Notification, Notifier, NotifyError};
use crate::config::NotificationConfig;
use crate::gateway::ApiFailure;
use crate::gates::SubstrateMismatch;
use crate::store::{SignatureSlot, StateStore, StoreError};

/// Sends notifications, suppressing failures already announced with the same signature
#[derive(Clone)]
pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    recipients: NotificationConfig,
}

impl NotificationGate {
    pub fn new(notifier: Arc<dyn Notifier>, recipients: &NotificationConfig) -> Self {
        Self {
            notifier,
            recipients: recipients.clone(),
        }
    }

    pub fn recipients(&self) -> &NotificationConfig {
        &self.recipients
    }

    /// Deliver to a recipient list; an empty list is a no-op
    pub async fn deliver(&self, recipients: &[String], rendered: Rendered) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            info!(subject = %rendered.subject, "No recipients configured; notification not sent");
            return Ok(());
        }
        self.notifier
            .send(&Notification {
                recipients: recipients.to_vec(),
                subject: rendered.subject,
                html_body: rendered.html_body,
            })
            .await
    }

    async fn announce_once(
        &self,
        store: &StateStore,
        order_id: i64,
        slot: SignatureSlot,
        signature: String,
        rendered: Rendered,
    ) -> Result<bool, StoreError> {
        let previous = store.order(order_id).await?.and_then(|order| match slot {
            SignatureSlot::Failure => order.last_failure_signature,
            SignatureSlot::SubstrateMismatch => order.last_substrate_signature,
        });
        if previous.as_deref() == Some(signature.as_str()) {
            info!(order_id, ?slot, "Notification suppressed; signature unchanged");
            return Ok(false);
        }

        match self.deliver(&self.recipients.admin, rendered).await {
            Ok(()) => {
                store.set_signature(order_id, slot, &signature, Utc::now()).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(order_id, error = %e, "Failure notification not delivered; will retry on next failure");
                Ok(false)
            }
        }
    }

    /// Announce an order failure unless this exact failure was already announced
    pub async fn order_failed(
        &self,
        store: &StateStore,
        order_id: i64,
        step: &str,
        message: &str,
        api: Option<&ApiFailure>,
    ) -> Result<bool, StoreError> {
        let signature = failure_signature(step, message, api);
        let rendered = templates::order_failed(order_id, step, message, api);
        self.announce_once(store, order_id, SignatureSlot::Failure, signature, rendered)
            .await
    }

    pub async fn substrate_mismatch(
        &self,
        store: &StateStore,
        order_id: i64,
        step: &str,
        mismatch: &SubstrateMismatch,
    ) -> Result<bool, StoreError> {
        let signature = substrate_signature(step, mismatch);
        let rendered = templates::substrate_mismatch(order_id, mismatch);
        self.announce_once(store, order_id, SignatureSlot::SubstrateMismatch, signature, rendered)
            .await
    }

    /// Ask CSR to approve items created in WAIT
    pub async fn items_created(&self, order_id: i64, items: &[String], reason: &str) {
        if items.is_empty() {
            return;
        }
        let rendered = templates::items_created(order_id, items, reason);
        if let Err(e) = self.deliver(&self.recipients.csr, rendered).await {
            warn!(order_id, error = %e, "Item creation notice not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotifier;
    use crate::store::{OrderStatus, OrderUpdate};

    fn recipients() -> NotificationConfig {
        NotificationConfig {
            admin: vec!["admin@example.com".to_string()],
            csr: vec!["csr@example.com".to_string()],
            ..NotificationConfig::default()
        }
    }

    async fn failed_order(store: &StateStore, order_id: i64) {
        store
            .record_progress(&OrderUpdate::new(order_id, OrderStatus::Failed, "SO_P2").error("Customer on stop"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_repeat_failure_is_announced_once() {
        let store = StateStore::in_memory().await.unwrap();
        failed_order(&store, 1001).await;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|n| n.recipients == ["admin@example.com"] && n.subject.contains("1001"))
            .times(2)
            .returning(|_| Ok(()));
        let gate = NotificationGate::new(Arc::new(notifier), &recipients());

        assert!(gate.order_failed(&store, 1001, "SO_P2", "Customer on stop", None).await.unwrap());
        assert!(!gate.order_failed(&store, 1001, "SO_P2", "Customer on stop", None).await.unwrap());
        assert!(gate.order_failed(&store, 1001, "SO_P2", "Price missing", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_undelivered_failure_is_retried() {
        let store = StateStore::in_memory().await.unwrap();
        failed_order(&store, 1002).await;

        let mut notifier = MockNotifier::new();
        let mut seq = mockall::Sequence::new();
        notifier
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(NotifyError::Delivery("smtp down".to_string())));
        notifier
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let gate = NotificationGate::new(Arc::new(notifier), &recipients());

        assert!(!gate.order_failed(&store, 1002, "PO_P4", "boom", None).await.unwrap());
        assert!(gate.order_failed(&store, 1002, "PO_P4", "boom", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_substrate_slot_is_independent() {
        let store = StateStore::in_memory().await.unwrap();
        failed_order(&store, 1003).await;

        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(2).returning(|_| Ok(()));
        let gate = NotificationGate::new(Arc::new(notifier), &recipients());
        let mismatch = SubstrateMismatch {
            base_item: "2300-ABC".to_string(),
            expected: "16P4-2300-ABC".to_string(),
            invalid: vec!["16P4-OTHER".to_string()],
            found: vec!["16P4-OTHER".to_string()],
        };

        assert!(gate.order_failed(&store, 1003, "PHASE1_FILM_VALIDATION", "x", None).await.unwrap());
        assert!(gate
            .substrate_mismatch(&store, 1003, "PHASE1_FILM_VALIDATION", &mismatch)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_items_created_goes_to_csr() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|n| n.recipients == ["csr@example.com"] && n.html_body.contains("1600-ABC"))
            .times(1)
            .returning(|_| Ok(()));
        let gate = NotificationGate::new(Arc::new(notifier), &recipients());

        gate.items_created(1001, &["1600-ABC".to_string()], "Items created in WAIT.").await;
        gate.items_created(1001, &[], "nothing").await;
    }
}
