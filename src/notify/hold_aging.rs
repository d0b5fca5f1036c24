use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::gate::NotificationGate;
use super::templates;
use crate::config::NotificationConfig;
use crate::store::{OrderState, OrderStatus, StateStore, StoreError};

/// Hold ageing thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    pub reminder_after: Duration,
    pub reminder_interval: Duration,
    pub escalate_after: Duration,
}

impl From<&NotificationConfig> for HoldPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            reminder_after: Duration::hours(config.hold_reminder_after_hours),
            reminder_interval: Duration::hours(config.hold_reminder_interval_hours),
            escalate_after: Duration::hours(config.hold_escalate_after_hours),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoldAssessment {
    pub age_hours: i64,
    pub remind: bool,
    pub escalate: bool,
}

/// What an ageing hold is due at `now`
pub fn assess(order: &OrderState, now: DateTime<Utc>, policy: &HoldPolicy) -> HoldAssessment {
    let Some(since) = order.hold_since.filter(|_| order.status == OrderStatus::Hold) else {
        return HoldAssessment::default();
    };
    let age = now - since;

    let remind = age >= policy.reminder_after
        && order
            .last_reminder_sent
            .map_or(true, |last| now - last >= policy.reminder_interval);
    let escalate = age >= policy.escalate_after && order.escalated_at.is_none();

    HoldAssessment {
        age_hours: age.num_hours(),
        remind,
        escalate,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoldReminderReport {
    pub reminded: usize,
    pub escalated: usize,
}

/// Send one batched reminder to CSR and one batched escalation to admins.
///
/// Orders are only marked once their batch was delivered, so an outage
/// postpones the reminder instead of losing it.
pub async fn send_hold_reminders(
    store: &StateStore,
    gate: &NotificationGate,
    now: DateTime<Utc>,
) -> Result<HoldReminderReport, StoreError> {
    let policy = HoldPolicy::from(gate.recipients());
    let held = store.orders_in(OrderStatus::Hold, &[]).await?;

    let mut reminders = Vec::new();
    let mut escalations = Vec::new();
    for order in &held {
        let assessment = assess(order, now, &policy);
        if assessment.remind {
            reminders.push((order, assessment.age_hours));
        }
        if assessment.escalate {
            escalations.push((order, assessment.age_hours));
        }
    }

    let mut report = HoldReminderReport::default();

    if !reminders.is_empty() {
        let rendered = templates::hold_reminder(&reminders, policy.reminder_after.num_hours());
        match gate.deliver(&gate.recipients().csr, rendered).await {
            Ok(()) => {
                for (order, _) in &reminders {
                    store.mark_reminder_sent(order.order_id, now).await?;
                }
                report.reminded = reminders.len();
                info!(count = report.reminded, "Sent hold reminder");
            }
            Err(e) => warn!(error = %e, "Hold reminder not delivered"),
        }
    }

    if !escalations.is_empty() {
        let rendered = templates::hold_escalation(&escalations, policy.escalate_after.num_hours());
        match gate.deliver(&gate.recipients().admin, rendered).await {
            Ok(()) => {
                for (order, _) in &escalations {
                    store.mark_escalated(order.order_id, now).await?;
                }
                report.escalated = escalations.len();
                info!(count = report.escalated, "Sent hold escalation");
            }
            Err(e) => warn!(error = %e, "Hold escalation not delivered"),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotifier;
    use crate::store::OrderUpdate;
    use std::sync::Arc;

    fn policy() -> HoldPolicy {
        HoldPolicy::from(&NotificationConfig::default())
    }

    fn held(hours_ago: i64, now: DateTime<Utc>) -> OrderState {
        OrderState {
            order_id: 1001,
            status: OrderStatus::Hold,
            last_step: "ITEM_CREATE_WAIT".to_string(),
            hold_since: Some(now - Duration::hours(hours_ago)),
            ..OrderState::default()
        }
    }

    #[test]
    fn young_holds_are_left_alone() {
        let now = Utc::now();
        let assessment = assess(&held(47, now), now, &policy());
        assert!(!assessment.remind);
        assert!(!assessment.escalate);
        assert_eq!(assessment.age_hours, 47);
    }

    #[test]
    fn reminder_repeats_daily() {
        let now = Utc::now();
        let mut order = held(60, now);
        assert!(assess(&order, now, &policy()).remind);

        order.last_reminder_sent = Some(now - Duration::hours(10));
        assert!(!assess(&order, now, &policy()).remind);

        order.last_reminder_sent = Some(now - Duration::hours(24));
        assert!(assess(&order, now, &policy()).remind);
    }

    #[test]
    fn escalation_happens_once() {
        let now = Utc::now();
        let mut order = held(121, now);
        assert!(assess(&order, now, &policy()).escalate);

        order.escalated_at = Some(now - Duration::hours(1));
        assert!(!assess(&order, now, &policy()).escalate);
    }

    #[test]
    fn orders_not_on_hold_are_ignored() {
        let now = Utc::now();
        let mut order = held(200, now);
        order.status = OrderStatus::Complete;
        assert_eq!(assess(&order, now, &policy()), HoldAssessment::default());
    }

    #[tokio::test]
    async fn test_reminders_marked_after_delivery() {
        let store = StateStore::in_memory().await.unwrap();
        store
            .record_progress(&OrderUpdate::new(1001, OrderStatus::Hold, "BASE_ITEM_WAIT").error("Base item not APP"))
            .await
            .unwrap();

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|n| n.recipients == ["csr@example.com"] && n.subject.contains("reminder"))
            .times(1)
            .returning(|_| Ok(()));
        let config = NotificationConfig {
            csr: vec!["csr@example.com".to_string()],
            ..NotificationConfig::default()
        };
        let gate = NotificationGate::new(Arc::new(notifier), &config);

        let later = Utc::now() + Duration::hours(50);
        let report = send_hold_reminders(&store, &gate, later).await.unwrap();
        assert_eq!(report, HoldReminderReport { reminded: 1, escalated: 0 });

        let order = store.order(1001).await.unwrap().unwrap();
        assert!(order.last_reminder_sent.is_some());

        let again = send_hold_reminders(&store, &gate, later + Duration::hours(1)).await.unwrap();
        assert_eq!(again.reminded, 0);
    }
}
