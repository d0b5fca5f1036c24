//! Outbound alerts for failures, created items and ageing holds
//!
//! Delivery is abstracted behind [`Notifier`] so the workflow can be run and
//! tested without a mail transport. Deduplication lives in [`NotificationGate`]:
//! a failure is announced once per distinct signature, never on every run.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lws_fulfillment::notify::{LogNotifier, Notification, Notifier};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let notifier = LogNotifier;
//!     notifier
//!         .send(&Notification {
//!             recipients: vec!["csr@example.com".to_string()],
//!             subject: "LWS: items created".to_string(),
//!             html_body: "<p>Approve items</p>".to_string(),
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod gate;
pub mod hold_aging;
pub mod signature;
pub mod summary;
pub mod templates;

pub use gate::NotificationGate;
pub use hold_aging::{assess, send_hold_reminders, HoldAssessment, HoldPolicy, HoldReminderReport};
pub use signature::{failure_signature, substrate_signature};
pub use summary::{send_hold_summary, SUMMARY_STEPS};

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget delivery channel
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            recipients = %notification.recipients.join(", "),
            subject = %notification.subject,
            body_len = notification.html_body.len(),
            "Notification"
        );
        Ok(())
    }
}
