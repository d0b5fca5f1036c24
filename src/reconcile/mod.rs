//! Post-completion reconciliation.
//!
//! Completed orders keep being watched. When the site-A order lines move,
//! the order is parked, the new job requirement quantities are pushed to the
//! existing downstream lines, and the order is released once site B has
//! reconfirmed. Every invocation works in three phases:
//!
//! - drift detection against the stored line baseline, plus the customer
//!   reference side channel
//! - requirement propagation for orders parked at
//!   `SO4_QTY_CHANGED_WAIT_RECONFIRM`; orders whose lines only moved dates
//!   go straight back to COMPLETE
//! - release of orders parked at a `P2_` reconfirm step once the site-B sales
//!   order line matches the site-B job line
//!
//! Gateway trouble on one order is logged and the order is left where it is;
//! only the local store can abort a pass.

use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::gateway::{LineQuantityUpdate, OrderLine, RemoteOrderGateway};
use crate::gates::{
    derive_dependent, line_baseline, line_drift, quantities_match, requirement_baseline, requirement_drift,
    ItemKind, RequirementDelta,
};
use crate::pipeline::{Completion, HoldKind, StepError, RECONCILIATION_STEPS};
use crate::store::{
    ApiDiagnostics, ChangeLogEntry, OrderState, OrderStatus, OrderUpdate, PoMapping, StateStore, StoreError,
};
use crate::telemetry::reconcile_span;


/// What one reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub baselined: usize,
    pub drift_held: usize,
    pub references_updated: usize,
    pub propagated: usize,
    pub manual_required: usize,
    pub released: usize,
    /// Orders skipped because the remote system failed
    pub errors: usize,
}

pub struct ReconciliationMonitor {
    gateway: Arc<dyn RemoteOrderGateway>,
    store: StateStore,
    batch_limit: i64,
}

impl ReconciliationMonitor {
    pub fn new(gateway: Arc<dyn RemoteOrderGateway>, store: StateStore, batch_limit: i64) -> Self {
        Self {
            gateway,
            store,
            batch_limit,
        }
    }

    /// One full pass over the candidate set
    pub async fn reconcile(&self, run_id: &str) -> Result<ReconcileReport, StoreError> {
        let mut report = ReconcileReport::default();

        let candidates = self
            .store
            .reconciliation_candidates(RECONCILIATION_STEPS, self.batch_limit)
            .await?;
        report.examined = candidates.len();

        self.detect_drift(run_id, &candidates, &mut report)
            .instrument(reconcile_span(run_id, "drift"))
            .await?;
        self.propagate_requirements(run_id, &mut report)
            .instrument(reconcile_span(run_id, "propagate"))
            .await?;
        self.release_reconfirmed(run_id, &mut report)
            .instrument(reconcile_span(run_id, "release"))
            .await?;

        info!(
            examined = report.examined,
            drift_held = report.drift_held,
            references_updated = report.references_updated,
            propagated = report.propagated,
            manual_required = report.manual_required,
            released = report.released,
            errors = report.errors,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn detect_drift(
        &self,
        run_id: &str,
        candidates: &[OrderState],
        report: &mut ReconcileReport,
    ) -> Result<(), StoreError> {
        for order in candidates {
            if order.last_step == Completion::AlreadyComplete.tag() {
                continue;
            }
            let lines = self.compare_lines(run_id, order, report).await;
            absorb(order.order_id, lines, report)?;
            let reference = self.sync_reference(run_id, order, report).await;
            absorb(order.order_id, reference, report)?;
        }
        Ok(())
    }

    async fn compare_lines(
        &self,
        run_id: &str,
        order: &OrderState,
        report: &mut ReconcileReport,
    ) -> Result<(), StepError> {
        let order_id = order.order_id;
        let current = self.gateway.order_lines(order_id).await?;
        let baseline = self.store.line_snapshots(order_id).await?;

        if baseline.is_empty() {
            if !current.is_empty() {
                self.store
                    .replace_line_snapshots(order_id, &line_baseline(&current))
                    .await?;
                report.baselined += 1;
                debug!(order_id, "Line baseline written");
            }
            return Ok(());
        }

        // Orders already parked keep their step; their drift is handled downstream
        if order.status != OrderStatus::Complete {
            return Ok(());
        }

        let drift = line_drift(&baseline, &current);
        if drift.is_empty() {
            return Ok(());
        }

        for change in &drift {
            self.store
                .append_change(&ChangeLogEntry::new(
                    order_id,
                    Some(run_id),
                    change.field_name(),
                    change.old_value.clone(),
                    change.new_value.clone(),
                ))
                .await?;
        }
        self.store
            .record_progress(
                &OrderUpdate::new(order_id, OrderStatus::Hold, HoldKind::QuantityChangedWaitReconfirm.tag())
                    .run(run_id)
                    .error(format!(
                        "Site-A order lines changed after completion ({} change(s)); waiting for reconfirmation",
                        drift.len()
                    )),
            )
            .await?;
        report.drift_held += 1;
        info!(order_id, changes = drift.len(), "Line drift detected; order parked for reconfirmation");
        Ok(())
    }

    /// Push a changed site-A customer reference to the site-B order
    async fn sync_reference(
        &self,
        run_id: &str,
        order: &OrderState,
        report: &mut ReconcileReport,
    ) -> Result<(), StepError> {
        let order_id = order.order_id;
        let header = self.gateway.order_header(order_id).await?;
        let current = header.customer_reference.unwrap_or_default().trim().to_string();

        let Some(snapshot) = self.store.header_snapshot(order_id).await? else {
            self.store.save_header_snapshot(order_id, &current).await?;
            return Ok(());
        };
        if snapshot.customer_reference == current {
            return Ok(());
        }

        let Some(sales_order) = order.ids.sales_order_site_b else {
            warn!(order_id, "Customer reference changed but no site-B order is known");
            return Ok(());
        };

        self.gateway.update_order_reference(sales_order, &current).await?;
        self.gateway.force_authorize(sales_order).await?;
        self.store
            .append_change(&ChangeLogEntry::new(
                order_id,
                Some(run_id),
                "customer_reference",
                Some(snapshot.customer_reference),
                Some(current.clone()),
            ))
            .await?;
        self.store.save_header_snapshot(order_id, &current).await?;
        report.references_updated += 1;
        info!(order_id, sales_order, reference = %current, "Customer reference propagated to site B");
        Ok(())
    }

    async fn propagate_requirements(&self, run_id: &str, report: &mut ReconcileReport) -> Result<(), StoreError> {
        let parked = self
            .store
            .orders_in(OrderStatus::Hold, &[HoldKind::QuantityChangedWaitReconfirm.tag()])
            .await?;

        for order in &parked {
            match self.propagate(run_id, order, report).await {
                Ok(()) => {}
                Err(StepError::Store(e)) => return Err(e),
                Err(e) => {
                    warn!(order_id = order.order_id, error = %e, "Requirement propagation failed; order stays parked");
                    let mut update = OrderUpdate::new(order.order_id, OrderStatus::Hold, order.last_step.clone())
                        .run(run_id)
                        .error(e.to_string());
                    if let Some(api) = e.api_failure() {
                        update = update.api(ApiDiagnostics::from(api));
                    }
                    self.store.record_progress(&update).await?;
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn propagate(&self, run_id: &str, order: &OrderState, report: &mut ReconcileReport) -> Result<(), StepError> {
        let order_id = order.order_id;
        let Some(job) = order.ids.job_site_a.as_deref() else {
            return self
                .require_manual(run_id, order_id, "No site-A job recorded; update site B by hand", report)
                .await;
        };

        let snapshots = self.store.requirement_snapshots(order_id).await?;
        let current = self.gateway.current_requirements(job).await?;
        let deltas = requirement_drift(&snapshots, &current);
        if deltas.is_empty() {
            let lines = self.gateway.order_lines(order_id).await?;
            let baseline = self.store.line_snapshots(order_id).await?;
            if line_drift(&baseline, &lines).iter().any(|d| d.field == "quantity") {
                debug!(order_id, job, "Requirements unchanged so far; waiting");
                return Ok(());
            }
            // Only dates moved and nothing downstream depends on them
            self.mark_reconciled(run_id, order, &lines).await?;
            report.released += 1;
            info!(order_id, job, "Line dates changed without requirement changes; order released");
            return Ok(());
        }

        let Some(sales_order) = order.ids.sales_order_site_b else {
            return self
                .require_manual(run_id, order_id, "No site-B order recorded; update site B by hand", report)
                .await;
        };

        let mappings = self.store.po_mappings(order_id).await?;
        let mut updates = Vec::new();
        for delta in &deltas {
            let Some(mapping) = mappings
                .iter()
                .find(|m| m.item_code.trim().eq_ignore_ascii_case(&delta.item_code))
            else {
                let reason = format!("No purchase order mapping for {}; update site B by hand", delta.item_code);
                return self.require_manual(run_id, order_id, &reason, report).await;
            };
            updates.extend(line_updates(delta, sales_order, mapping));
        }

        for update in &updates {
            self.gateway.update_line_quantity(update).await?;
            debug!(order_id, entity = update.entity(), quantity = update.quantity(), "Line quantity updated");
        }
        self.gateway.force_authorize(sales_order).await?;

        self.store
            .replace_requirement_snapshots(order_id, &requirement_baseline(&current))
            .await?;
        for delta in &deltas {
            if delta.quantity_changed() {
                self.store
                    .append_change(&ChangeLogEntry::new(
                        order_id,
                        Some(run_id),
                        format!("requirement {} quantity", delta.item_code),
                        delta.old_quantity.map(|q| q.to_string()),
                        Some(delta.new_quantity.to_string()),
                    ))
                    .await?;
            }
            if delta.date_changed() {
                self.store
                    .append_change(&ChangeLogEntry::new(
                        order_id,
                        Some(run_id),
                        format!("requirement {} required_date", delta.item_code),
                        delta.old_required_date.map(|d| d.to_string()),
                        delta.required_date.map(|d| d.to_string()),
                    ))
                    .await?;
            }
        }
        self.store
            .record_progress(
                &OrderUpdate::new(order_id, OrderStatus::Hold, HoldKind::SalesOrderUpdatedWaitReconfirm.tag())
                    .run(run_id)
                    .error(format!("Site-B SO {sales_order} updated; waiting for reconfirmation")),
            )
            .await?;
        report.propagated += 1;
        info!(order_id, sales_order, changes = deltas.len(), "Requirement changes pushed to site B");
        Ok(())
    }

    async fn require_manual(
        &self,
        run_id: &str,
        order_id: i64,
        reason: &str,
        report: &mut ReconcileReport,
    ) -> Result<(), StepError> {
        self.store
            .record_progress(
                &OrderUpdate::new(order_id, OrderStatus::Hold, HoldKind::ManualCompletionRequired.tag())
                    .run(run_id)
                    .error(reason),
            )
            .await?;
        report.manual_required += 1;
        warn!(order_id, reason, "Manual completion required");
        Ok(())
    }

    async fn release_reconfirmed(&self, run_id: &str, report: &mut ReconcileReport) -> Result<(), StoreError> {
        let parked = self
            .store
            .orders_in(
                OrderStatus::Hold,
                &[
                    HoldKind::SalesOrderUpdatedWaitReconfirm.tag(),
                    HoldKind::ManualCompletionRequired.tag(),
                ],
            )
            .await?;

        for order in &parked {
            let outcome = self.release(run_id, order, report).await;
            absorb(order.order_id, outcome, report)?;
        }
        Ok(())
    }

    async fn release(&self, run_id: &str, order: &OrderState, report: &mut ReconcileReport) -> Result<(), StepError> {
        let order_id = order.order_id;
        let (Some(sales_order), Some(job)) = (order.ids.sales_order_site_b, order.ids.job_site_b.as_deref()) else {
            debug!(order_id, "No site-B order or job recorded; cannot compare");
            return Ok(());
        };

        let lines = self.gateway.line_status(sales_order).await?;
        let so_quantity = lines.first().map(|line| line.ordered_qty);
        let job_quantity = self.gateway.job_line_quantity(job).await?;

        match (so_quantity, job_quantity) {
            (Some(so_qty), Some(job_qty)) if quantities_match(so_qty, job_qty) => {}
            _ => {
                debug!(order_id, so_quantity = ?so_quantity, job_quantity = ?job_quantity, "Site B not reconfirmed yet");
                return Ok(());
            }
        }

        let current = self.gateway.order_lines(order_id).await?;
        self.mark_reconciled(run_id, order, &current).await?;
        report.released += 1;
        info!(order_id, sales_order, job, "Site B reconfirmed; order released to COMPLETE");
        Ok(())
    }

    /// Move the line baseline to `current` and return the order to COMPLETE
    async fn mark_reconciled(&self, run_id: &str, order: &OrderState, current: &[OrderLine]) -> Result<(), StoreError> {
        let order_id = order.order_id;
        self.store
            .replace_line_snapshots(order_id, &line_baseline(current))
            .await?;
        let tag = Completion::Reconciled.tag();
        self.store
            .record_progress(&OrderUpdate::new(order_id, OrderStatus::Complete, tag).run(run_id))
            .await?;
        self.store
            .append_change(&ChangeLogEntry::new(
                order_id,
                Some(run_id),
                "status",
                Some(order.last_step.clone()),
                Some(tag.to_string()),
            ))
            .await
    }
}

/// The downstream line updates one requirement change needs
fn line_updates(delta: &RequirementDelta, sales_order: i64, mapping: &PoMapping) -> Vec<LineQuantityUpdate> {
    let finished_good = derive_dependent(&delta.item_code, ItemKind::FinishedGood);
    let sales_order = mapping.sales_order_site_b.unwrap_or(sales_order);
    let mut updates = vec![
        LineQuantityUpdate::PurchaseOrder {
            po_number: mapping.po_number,
            line: mapping.po_line,
            item_code: delta.item_code.clone(),
            quantity: delta.new_quantity,
        },
        LineQuantityUpdate::SalesOrder {
            sales_order,
            line: mapping.so_line.unwrap_or(1),
            item_code: finished_good.clone(),
            quantity: delta.new_quantity,
            required_date: delta.required_date,
        },
    ];
    if let Some(shipping_request) = &mapping.shipping_request {
        updates.push(LineQuantityUpdate::ShippingRequest {
            shipping_request: shipping_request.clone(),
            sales_order,
            item_code: finished_good,
            quantity: delta.new_quantity,
        });
    }
    updates
}

/// Keep going past remote failures on a single order; the store still aborts
fn absorb(order_id: i64, outcome: Result<(), StepError>, report: &mut ReconcileReport) -> Result<(), StoreError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(StepError::Store(e)) => Err(e),
        Err(e) => {
            warn!(order_id, error = %e, "Reconciliation skipped order after remote error");
            report.errors += 1;
            Ok(())
        }
    }
}
