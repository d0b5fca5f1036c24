use std::fmt;

use crate::store::{OrderState, OrderStatus};

/// Position of an order in the pipeline.
///
/// Per-requirement steps carry the index of the requirement being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Eligible,
    ItemGatePreJob,
    JobSiteA,
    RequirementsSiteA,
    SubstrateValidation,
    ItemGate,
    PurchaseOrder(usize),
    SalesOrder(usize),
    ShippingRequest(usize),
    JobSiteB(usize),
    Complete,
}

impl Step {
    /// Tag persisted as `last_step`
    pub fn tag(&self) -> &'static str {
        match self {
            Step::Eligible => "ELIGIBLE",
            Step::ItemGatePreJob => "ITEM_GATE_PRE_JOB",
            Step::JobSiteA => "JOB_P4",
            Step::RequirementsSiteA => "REQS_P4",
            Step::SubstrateValidation => "PHASE1_FILM_VALIDATION",
            Step::ItemGate => "ITEM_GATE",
            Step::PurchaseOrder(_) => "PO_P4",
            Step::SalesOrder(_) => "SO_P2",
            Step::ShippingRequest(_) => "SHIPREQ_P2",
            Step::JobSiteB(_) => "JOB_P2",
            Step::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::PurchaseOrder(i) | Step::SalesOrder(i) | Step::ShippingRequest(i) | Step::JobSiteB(i) => {
                write!(f, "{}[{}]", self.tag(), i)
            }
            _ => f.write_str(self.tag()),
        }
    }
}

/// Why an order is paused. Each kind is persisted under its own step tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldKind {
    BaseItemWait,
    ItemCreateWait,
    SubstrateItemWait,
    FinishedGoodItemWait,
    JobSiteAHold,
    SalesOrderStatusHold,
    ShippingLinesWait,
    JobSiteBOnHold,
    QuantityChangedWaitReconfirm,
    SalesOrderUpdatedWaitReconfirm,
    ManualCompletionRequired,
}

impl HoldKind {
    pub fn tag(&self) -> &'static str {
        match self {
            HoldKind::BaseItemWait => "BASE_ITEM_WAIT",
            HoldKind::ItemCreateWait => "ITEM_CREATE_WAIT",
            HoldKind::SubstrateItemWait => "ITEM_WAIT_GATE_PT",
            HoldKind::FinishedGoodItemWait => "ITEM_WAIT_GATE_SP",
            HoldKind::JobSiteAHold => "JOB_P4_HOLD",
            HoldKind::SalesOrderStatusHold => "SO_P2_STATUS_HOLD",
            HoldKind::ShippingLinesWait => "SHIPREQ_P2_WAIT_LINES",
            HoldKind::JobSiteBOnHold => "JOB_P2_SO_ON_HOLD",
            HoldKind::QuantityChangedWaitReconfirm => "SO4_QTY_CHANGED_WAIT_RECONFIRM",
            HoldKind::SalesOrderUpdatedWaitReconfirm => "P2_SO_QTY_UPDATED_WAIT_RECONFIRM",
            HoldKind::ManualCompletionRequired => "P2_MANUAL_COMPLETE_REQUIRED",
        }
    }

    /// Holds owned by the reconciliation monitor rather than the pipeline
    pub fn is_reconciliation(&self) -> bool {
        matches!(
            self,
            HoldKind::QuantityChangedWaitReconfirm
                | HoldKind::SalesOrderUpdatedWaitReconfirm
                | HoldKind::ManualCompletionRequired
        )
    }
}

impl fmt::Display for HoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Step tags of the holds parked with the reconciliation monitor
pub const RECONCILIATION_STEPS: &[&str] = &[
    "SO4_QTY_CHANGED_WAIT_RECONFIRM",
    "P2_SO_QTY_UPDATED_WAIT_RECONFIRM",
    "P2_MANUAL_COMPLETE_REQUIRED",
];

/// Whether the reconciliation monitor owns this order
pub fn is_reconciling(order: &OrderState) -> bool {
    order.status == OrderStatus::Hold && RECONCILIATION_STEPS.contains(&order.last_step.as_str())
}

/// How an order reached COMPLETE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every requirement was driven through site B
    Complete,
    /// The site-B order was already fulfilled; no site-B job was created
    AlreadyComplete,
    /// Released by reconciliation once site B matched again
    Reconciled,
}

impl Completion {
    pub fn tag(&self) -> &'static str {
        match self {
            Completion::Complete => "COMPLETE",
            Completion::AlreadyComplete => "SO_P2_ALREADY_COMPLETE",
            Completion::Reconciled => "RECONCILED_COMPLETE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_requirement_steps_share_a_tag() {
        assert_eq!(Step::PurchaseOrder(0).tag(), Step::PurchaseOrder(3).tag());
        assert_eq!(Step::SalesOrder(1).to_string(), "SO_P2[1]");
        assert_eq!(Step::JobSiteA.to_string(), "JOB_P4");
    }

    #[test]
    fn reconciliation_holds_match_their_step_list() {
        let kinds = [
            HoldKind::BaseItemWait,
            HoldKind::ItemCreateWait,
            HoldKind::SubstrateItemWait,
            HoldKind::FinishedGoodItemWait,
            HoldKind::JobSiteAHold,
            HoldKind::SalesOrderStatusHold,
            HoldKind::ShippingLinesWait,
            HoldKind::JobSiteBOnHold,
            HoldKind::QuantityChangedWaitReconfirm,
            HoldKind::SalesOrderUpdatedWaitReconfirm,
            HoldKind::ManualCompletionRequired,
        ];
        for kind in kinds {
            assert_eq!(kind.is_reconciliation(), RECONCILIATION_STEPS.contains(&kind.tag()));
        }
    }
}
