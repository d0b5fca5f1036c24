//! Scheduled-run orchestration.
//!
//! A run takes the exclusive lock, opens a run record, reconciles completed
//! orders, assembles the order queue, drives every queued order through the
//! pipeline and finishes with price codes for newly created items and hold
//! reminders. Queueing a single order on operator request lives here as well.

use chrono::Utc;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::gateway::RemoteOrderGateway;
use crate::notify::{send_hold_reminders, HoldReminderReport, NotificationGate};
use crate::pipeline::{is_reconciling, OrderOutcome, PipelineExecutor};
use crate::reconcile::{ReconcileReport, ReconciliationMonitor};
use crate::store::{OrderStatus, OrderUpdate, RunCounts, RunRecord, StateStore};
use crate::telemetry::{generate_run_id, order_span, run_span};

/// Exclusive file lock keeping a second run from starting
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        Ok(Self {
            lock: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Take the lock without waiting
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let path = self.path.clone();
        self.lock.try_write().map_err(|e| match e.kind() {
            ErrorKind::WouldBlock => WorkflowError::RunInProgress { path },
            _ => WorkflowError::Io(e),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuedOrder {
    order_id: i64,
    manual: bool,
}

/// Answer to an operator queue request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Queued,
    /// Not an order this workflow handles
    NotEligible,
    /// Removed by an operator; reset it before queueing
    Removed,
    /// Parked with the reconciliation monitor
    Reconciling,
}

/// What one run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub counts: RunCounts,
    pub reconciliation: ReconcileReport,
    pub created_items: Vec<String>,
    pub price_codes_applied: bool,
    pub reminders: HoldReminderReport,
}

pub struct WorkflowRunner {
    gateway: Arc<dyn RemoteOrderGateway>,
    store: StateStore,
    notifications: NotificationGate,
    config: WorkflowConfig,
}

impl WorkflowRunner {
    pub fn new(
        gateway: Arc<dyn RemoteOrderGateway>,
        store: StateStore,
        notifications: NotificationGate,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            notifications,
            config,
        }
    }

    /// One scheduled run under the exclusive lock
    pub async fn run(&self) -> Result<RunSummary> {
        let mut lock = RunLock::open(&self.config.workflow.lock_path)?;
        let _guard = lock.try_acquire()?;

        let run_id = generate_run_id();
        let span = run_span(&run_id, self.config.env);
        self.execute(&run_id).instrument(span).await
    }

    /// The run itself, without the lock
    pub async fn execute(&self, run_id: &str) -> Result<RunSummary> {
        let host = hostname::get().ok().and_then(|h| h.into_string().ok());
        self.store
            .begin_run(&RunRecord {
                run_id: run_id.to_string(),
                started_at: Utc::now(),
                ended_at: None,
                env: self.config.env.as_str().to_string(),
                host,
                counts: RunCounts::default(),
            })
            .await?;

        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            ..RunSummary::default()
        };

        let outcome = self.drive(run_id, &mut summary).await;
        if let Err(e) = &outcome {
            error!(error = %e, "Run aborted; closing it with partial counts");
        }
        let closed = self.store.close_run(run_id, Utc::now(), &summary.counts).await;
        outcome?;
        closed?;

        info!(
            run_id,
            eligible = summary.counts.eligible,
            processed = summary.counts.processed,
            held = summary.counts.held,
            failed = summary.counts.failed,
            "Run finished"
        );
        Ok(summary)
    }

    /// Everything between opening and closing the run record
    async fn drive(&self, run_id: &str, summary: &mut RunSummary) -> Result<()> {
        let monitor = ReconciliationMonitor::new(
            self.gateway.clone(),
            self.store.clone(),
            self.config.workflow.reconciliation_batch_limit,
        );
        summary.reconciliation = monitor.reconcile(run_id).await?;

        let queue = self.assemble_queue().await?;
        summary.counts.eligible = queue.len() as i64;
        info!(eligible = queue.len(), "Order queue assembled");

        let executor = PipelineExecutor::new(
            self.gateway.clone(),
            self.store.clone(),
            self.notifications.clone(),
            self.config.workflow.clone(),
        );
        let mut created = Vec::new();
        for entry in &queue {
            let outcome = executor
                .process_order(run_id, entry.order_id)
                .instrument(order_span(run_id, entry.order_id))
                .await?;
            if entry.manual {
                self.store.mark_queue_processed(entry.order_id).await?;
            }

            match &outcome {
                OrderOutcome::Skipped => continue,
                OrderOutcome::Held(hold) => {
                    summary.counts.held += 1;
                    created.extend(hold.created_items.iter().cloned());
                }
                OrderOutcome::Failed(_) => summary.counts.failed += 1,
                OrderOutcome::Completed(_) => {}
            }
            summary.counts.processed += 1;
        }

        created.sort();
        created.dedup();
        summary.price_codes_applied = self.apply_price_codes(&created).await;
        summary.created_items = created;

        summary.reminders = send_hold_reminders(&self.store, &self.notifications, Utc::now()).await?;
        Ok(())
    }

    /// Manual queue first, then remote eligible orders, then orders reset to NEW
    async fn assemble_queue(&self) -> Result<Vec<QueuedOrder>> {
        let mut seen = HashSet::new();
        let mut queue = Vec::new();

        for order_id in self.store.pending_queue().await? {
            if self.blocked(order_id).await? {
                info!(order_id, "Queued order was removed or is reconciling; dropping it from the queue");
                self.store.mark_queue_processed(order_id).await?;
                continue;
            }
            if seen.insert(order_id) {
                queue.push(QueuedOrder { order_id, manual: true });
            }
        }

        let limit = self.config.workflow.max_orders_per_run;
        let remote = self
            .gateway
            .find_eligible_orders(self.config.workflow.eligibility_start_date, limit)
            .await?;
        for order_id in remote {
            if seen.contains(&order_id) || !self.accepts(order_id).await? {
                continue;
            }
            seen.insert(order_id);
            queue.push(QueuedOrder { order_id, manual: false });
        }

        for order in self.store.orders_in(OrderStatus::New, &[]).await? {
            if seen.insert(order.order_id) {
                queue.push(QueuedOrder {
                    order_id: order.order_id,
                    manual: false,
                });
            }
        }

        queue.truncate(limit);
        Ok(queue)
    }

    /// Whether a remote eligible order belongs in the pipeline queue
    async fn accepts(&self, order_id: i64) -> Result<bool> {
        if self.store.is_complete(order_id).await? {
            return Ok(false);
        }
        Ok(!self.blocked(order_id).await?)
    }

    /// Removed or reconciling orders never enter the pipeline
    async fn blocked(&self, order_id: i64) -> Result<bool> {
        Ok(self
            .store
            .order(order_id)
            .await?
            .is_some_and(|order| order.status == OrderStatus::Removed || is_reconciling(&order)))
    }

    /// Price codes only follow a successful price update
    async fn apply_price_codes(&self, created: &[String]) -> bool {
        let updated = self.gateway.trigger_price_update().await;
        if !updated {
            if !created.is_empty() {
                warn!(items = created.len(), "Skipping price codes because the price update did not succeed");
            }
            return false;
        }
        if created.is_empty() {
            return false;
        }
        match self.gateway.apply_price_codes(created).await {
            Ok(()) => {
                info!(items = ?created, "Price codes applied to created items");
                true
            }
            Err(e) => {
                warn!(error = %e, "Price code update failed");
                false
            }
        }
    }

    /// Queue an order for the next run after checking it is a valid workflow order
    pub async fn queue_order(&self, order_id: i64) -> Result<QueueOutcome> {
        if let Some(order) = self.store.order(order_id).await? {
            if order.status == OrderStatus::Removed {
                warn!(order_id, "Order was removed; not queued");
                return Ok(QueueOutcome::Removed);
            }
            if is_reconciling(&order) {
                warn!(order_id, step = %order.last_step, "Order is parked for reconciliation; not queued");
                return Ok(QueueOutcome::Reconciling);
            }
        }
        if !self.gateway.is_eligible_order(order_id).await? {
            warn!(order_id, "Order is not a valid LWS order; not queued");
            return Ok(QueueOutcome::NotEligible);
        }
        self.store
            .record_progress(&OrderUpdate::new(order_id, OrderStatus::New, "ELIGIBLE"))
            .await?;
        self.store.enqueue(order_id).await?;
        Ok(QueueOutcome::Queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::gateway::fake::{FakeErp, WriteCall};
    use crate::gates::ItemKind;
    use crate::notify::LogNotifier;

    const BASE: &str = "LWS-100";
    const SUBSTRATE: &str = "16P4-LWS-100";

    fn config() -> WorkflowConfig {
        let mut config = WorkflowConfig::default();
        config.workflow.status_poll_delay_ms = 0;
        config.workflow.line_visibility_delay_ms = 0;
        config
    }

    async fn runner_with(erp: FakeErp, config: WorkflowConfig) -> (Arc<FakeErp>, StateStore, WorkflowRunner) {
        let erp = Arc::new(erp);
        let store = StateStore::in_memory().await.unwrap();
        let gate = NotificationGate::new(Arc::new(LogNotifier), &NotificationConfig::default());
        let runner = WorkflowRunner::new(erp.clone(), store.clone(), gate, config);
        (erp, store, runner)
    }

    fn two_orders() -> FakeErp {
        FakeErp::new()
            .with_order(1001, BASE, 1200.0, "REF-1")
            .with_order(1002, "LWS-200", 800.0, "REF-2")
            .with_approved_items(BASE)
            .with_item("LWS-200", "APP")
            .with_requirements(1001, &[(SUBSTRATE, 1200.0)])
            .with_requirements(1002, &[("16P4-LWS-200", 800.0)])
    }

    #[tokio::test]
    async fn test_run_processes_eligible_orders_and_records_counts() {
        let (erp, store, runner) = runner_with(two_orders(), config()).await;

        let summary = runner.execute("run-1").await.unwrap();
        assert_eq!(summary.counts.eligible, 2);
        assert_eq!(summary.counts.processed, 2);
        assert_eq!(summary.counts.held, 1);
        assert_eq!(summary.counts.failed, 0);
        assert_eq!(
            summary.created_items,
            vec!["1600-LWS-200".to_string(), "16P4-LWS-200".to_string()]
        );
        assert!(summary.price_codes_applied);
        assert!(erp.writes().contains(&WriteCall::PriceUpdate));

        let run = store.run("run-1").await.unwrap().unwrap();
        assert!(run.ended_at.is_some());
        assert_eq!(run.counts.held, 1);
        assert_eq!(store.run_orders("run-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_completed_orders_are_not_requeued() {
        let (_erp, _store, runner) = runner_with(two_orders(), config()).await;
        runner.execute("run-1").await.unwrap();

        let second = runner.execute("run-2").await.unwrap();
        // 1001 is complete; 1002 is still waiting on its items
        assert_eq!(second.counts.eligible, 1);
        assert_eq!(second.counts.held, 1);
    }

    #[tokio::test]
    async fn test_price_codes_wait_for_successful_update() {
        let erp = two_orders();
        erp.state().price_update_succeeds = false;
        let (erp, _store, runner) = runner_with(erp, config()).await;

        let summary = runner.execute("run-1").await.unwrap();
        assert!(!summary.price_codes_applied);
        assert_eq!(erp.count_writes(|w| matches!(w, WriteCall::ApplyPriceCodes(_))), 0);
    }

    #[tokio::test]
    async fn test_partially_created_items_still_get_price_codes() {
        let erp = FakeErp::new()
            .with_order(1002, "LWS-200", 800.0, "REF-2")
            .with_item("LWS-200", "APP");
        erp.state().refused_item_kinds.insert(ItemKind::FinishedGood);
        let (erp, _store, runner) = runner_with(erp, config()).await;

        let summary = runner.execute("run-1").await.unwrap();
        assert_eq!(summary.counts.held, 1);
        assert_eq!(summary.created_items, vec!["16P4-LWS-200".to_string()]);
        assert!(summary.price_codes_applied);
        assert!(erp
            .writes()
            .contains(&WriteCall::ApplyPriceCodes(vec!["16P4-LWS-200".to_string()])));
    }

    #[tokio::test]
    async fn test_manual_queue_goes_first_and_is_consumed() {
        let mut config = config();
        config.workflow.max_orders_per_run = 1;
        let erp = two_orders();
        let (_erp, store, runner) = runner_with(erp, config).await;

        assert_eq!(runner.queue_order(1001).await.unwrap(), QueueOutcome::Queued);
        let summary = runner.execute("run-1").await.unwrap();
        assert_eq!(summary.counts.eligible, 1);
        assert_eq!(
            store.order(1001).await.unwrap().unwrap().status,
            OrderStatus::Complete
        );
        assert!(store.pending_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queue_rejects_unknown_orders() {
        let (_erp, store, runner) = runner_with(two_orders(), config()).await;
        assert_eq!(runner.queue_order(4242).await.unwrap(), QueueOutcome::NotEligible);
        assert!(store.order(4242).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_removed_and_parked_orders_stay_out_of_the_queue() {
        let (erp, store, runner) = runner_with(two_orders(), config()).await;
        store.remove_order(1001).await.unwrap();
        store
            .record_progress(&OrderUpdate::new(1002, OrderStatus::Hold, "SO4_QTY_CHANGED_WAIT_RECONFIRM"))
            .await
            .unwrap();

        let summary = runner.execute("run-1").await.unwrap();
        assert_eq!(summary.counts.eligible, 0);
        assert_eq!(erp.count_writes(|w| matches!(w, WriteCall::CreateJob { .. })), 0);
    }

    #[tokio::test]
    async fn test_retry_brings_failed_order_back() {
        let erp = FakeErp::new()
            .with_order(1001, BASE, 1200.0, "REF-1")
            .with_approved_items(BASE);
        let (erp, store, runner) = runner_with(erp, config()).await;

        runner.execute("run-1").await.unwrap();
        assert_eq!(store.order(1001).await.unwrap().unwrap().status, OrderStatus::Failed);

        erp.state().requirements.insert(
            "P4J-1001".to_string(),
            vec![crate::gateway::fake::requirement("P4J-1001", SUBSTRATE, 1200.0)],
        );
        assert!(store.reset_order(1001).await.unwrap());
        let order = store.order(1001).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.last_step, "ELIGIBLE");
        assert_eq!(order.ids.job_site_a.as_deref(), Some("P4J-1001"));

        runner.execute("run-2").await.unwrap();
        assert_eq!(store.order(1001).await.unwrap().unwrap().status, OrderStatus::Complete);
        assert_eq!(
            erp.count_writes(|w| matches!(w, WriteCall::CreateJob { site: crate::gateway::Site::SiteA, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_queue_refuses_removed_and_reconciling_orders() {
        let (erp, store, runner) = runner_with(two_orders(), config()).await;
        store.remove_order(1001).await.unwrap();
        store
            .record_progress(&OrderUpdate::new(1002, OrderStatus::Hold, "P2_SO_QTY_UPDATED_WAIT_RECONFIRM"))
            .await
            .unwrap();

        assert_eq!(runner.queue_order(1001).await.unwrap(), QueueOutcome::Removed);
        assert_eq!(runner.queue_order(1002).await.unwrap(), QueueOutcome::Reconciling);
        assert!(store.pending_queue().await.unwrap().is_empty());
        assert_eq!(store.order(1001).await.unwrap().unwrap().status, OrderStatus::Removed);

        // Entries queued before the order was parked are dropped, not driven
        store
            .record_progress(&OrderUpdate::new(1002, OrderStatus::Hold, "ITEM_CREATE_WAIT"))
            .await
            .unwrap();
        assert_eq!(runner.queue_order(1002).await.unwrap(), QueueOutcome::Queued);
        store
            .record_progress(&OrderUpdate::new(1002, OrderStatus::Hold, "SO4_QTY_CHANGED_WAIT_RECONFIRM"))
            .await
            .unwrap();
        let summary = runner.execute("run-1").await.unwrap();
        assert_eq!(summary.counts.eligible, 0);
        assert!(store.pending_queue().await.unwrap().is_empty());
        assert_eq!(erp.count_writes(|w| matches!(w, WriteCall::CreateJob { .. })), 0);
        assert!(is_reconciling(&store.order(1002).await.unwrap().unwrap()));
    }

    #[tokio::test]
    async fn test_store_failure_mid_queue_still_closes_run() {
        let (_erp, store, runner) = runner_with(two_orders(), config()).await;
        // Completing 1001 needs this table; holding 1002 does not
        sqlx::query("DROP TABLE requirement_snapshots")
            .execute(store.pool())
            .await
            .unwrap();

        let error = runner.execute("run-broken").await.unwrap_err();
        assert!(matches!(error, WorkflowError::Store(_)));

        let run = store.run("run-broken").await.unwrap().unwrap();
        assert!(run.ended_at.is_some());
        assert_eq!(run.counts.eligible, 2);
        assert_eq!(run.counts.processed, 1);
        assert_eq!(run.counts.held, 1);
    }
}
