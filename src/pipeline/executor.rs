use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::outcome::{Failure, Hold, OrderOutcome, StepError, StepOutcome};
use super::step::{is_reconciling, Completion, HoldKind, Step};
use crate::config::PipelineConfig;
use crate::gateway::{
    ApiFailure, GatewayError, OrderLine, PurchaseOrderRequest, RemoteOrderGateway, Requirement, SalesOrderRequest, Site,
};
use crate::gates::{
    core_of, derive_dependent, evaluate_item_gate, is_site_b_job_hold, line_baseline, requirement_baseline,
    validate_printed_substrate, ItemGateDecision, ItemKind, ItemSnapshot,
};
use crate::notify::NotificationGate;
use crate::store::{
    ApiDiagnostics, DerivedIds, OrderStatus, OrderUpdate, PoMapping, RunOrderStatus, StateStore, StoreError,
};

/// Site-B sales order statuses
const SO_AUTHORIZED: i64 = 0;
const SO_HELD: i64 = 1;
const SO_CREDIT_HELD: i64 = 2;
const SO_COMPLETE: i64 = 9;

/// Whether an artifact was already there or was just created
enum Located<T, U> {
    Existing(T),
    Created(U),
}

/// Everything learned about an order while driving it
#[derive(Debug, Default)]
struct OrderContext {
    order_id: i64,
    run_id: String,
    ids: DerivedIds,
    lines: Vec<OrderLine>,
    customer_reference: String,
    requirements: Vec<Requirement>,
}

impl OrderContext {
    fn new(order_id: i64, run_id: &str) -> Self {
        Self {
            order_id,
            run_id: run_id.to_string(),
            ..Self::default()
        }
    }

    fn requirement(&self, index: usize) -> Result<&Requirement, StepError> {
        self.requirements
            .get(index)
            .ok_or_else(|| StepError::Data(format!("Requirement {index} missing for order {}", self.order_id)))
    }

    fn job_site_a(&self) -> Result<&str, StepError> {
        self.ids
            .job_site_a
            .as_deref()
            .ok_or_else(|| StepError::Data(format!("No site-A job recorded for order {}", self.order_id)))
    }

    fn po_number(&self) -> Result<i64, StepError> {
        self.ids
            .po_number
            .ok_or_else(|| StepError::Data(format!("No purchase order recorded for order {}", self.order_id)))
    }

    fn sales_order(&self) -> Result<i64, StepError> {
        self.ids
            .sales_order_site_b
            .ok_or_else(|| StepError::Data(format!("No site-B sales order recorded for order {}", self.order_id)))
    }

    fn update(&self, status: OrderStatus, step: &str) -> OrderUpdate {
        OrderUpdate::new(self.order_id, status, step)
            .run(self.run_id.clone())
            .ids(self.ids.clone())
    }
}

/// Drives one order at a time through the fulfillment steps.
///
/// Every run starts from the top; steps that already produced their artifact
/// find it again through the existence checks and move on without a write.
pub struct PipelineExecutor {
    gateway: Arc<dyn RemoteOrderGateway>,
    store: StateStore,
    notifications: NotificationGate,
    config: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(
        gateway: Arc<dyn RemoteOrderGateway>,
        store: StateStore,
        notifications: NotificationGate,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            notifications,
            config,
        }
    }

    /// Drive one order as far as it can go in this run.
    ///
    /// Holds and failures are order outcomes; only a state-store problem is an error.
    pub async fn process_order(&self, run_id: &str, order_id: i64) -> Result<OrderOutcome, StoreError> {
        if self.store.is_complete(order_id).await? {
            info!(order_id, "Order already COMPLETE; skipping");
            self.store
                .mark_run_order(run_id, order_id, RunOrderStatus::Skipped, "ALREADY_COMPLETE")
                .await?;
            return Ok(OrderOutcome::Skipped);
        }
        if let Some(existing) = self.store.order(order_id).await? {
            if existing.status == OrderStatus::Removed {
                info!(order_id, "Order removed by operator; skipping");
                self.store
                    .mark_run_order(run_id, order_id, RunOrderStatus::Skipped, &existing.last_step)
                    .await?;
                return Ok(OrderOutcome::Skipped);
            }
            if is_reconciling(&existing) {
                info!(order_id, step = %existing.last_step, "Order parked for reconciliation; skipping");
                self.store
                    .mark_run_order(run_id, order_id, RunOrderStatus::Skipped, &existing.last_step)
                    .await?;
                return Ok(OrderOutcome::Skipped);
            }
        }

        let mut ctx = OrderContext::new(order_id, run_id);
        let mut step = Step::Eligible;
        loop {
            self.store
                .record_progress(&ctx.update(OrderStatus::InProgress, step.tag()))
                .await?;
            self.store
                .mark_run_order(run_id, order_id, RunOrderStatus::InProgress, step.tag())
                .await?;

            let outcome = match self.run_step(step, &mut ctx).await {
                Ok(outcome) => outcome,
                Err(StepError::Store(e)) => return Err(e),
                Err(e) => StepOutcome::Failed(Failure::from_error(step, &e)),
            };

            match outcome {
                StepOutcome::Advanced(next) => {
                    debug!(order_id, from = %step, to = %next, "Step advanced");
                    step = next;
                }
                StepOutcome::Held(hold) => return self.hold(&ctx, hold).await,
                StepOutcome::Failed(failure) => return self.fail(&ctx, failure).await,
                StepOutcome::Terminal(completion) => return self.complete(&ctx, completion).await,
            }
        }
    }

    async fn run_step(&self, step: Step, ctx: &mut OrderContext) -> Result<StepOutcome, StepError> {
        match step {
            Step::Eligible => self.load_order(ctx).await,
            Step::ItemGatePreJob => {
                let base = ctx
                    .ids
                    .base_item_code
                    .clone()
                    .ok_or_else(|| StepError::Data(format!("No base item for order {}", ctx.order_id)))?;
                Ok(match self.check_items(ctx, &base, false).await? {
                    Some(hold) => StepOutcome::Held(hold),
                    None => StepOutcome::Advanced(Step::JobSiteA),
                })
            }
            Step::JobSiteA => self.job_site_a(ctx).await,
            Step::RequirementsSiteA => self.load_requirements(ctx).await,
            Step::SubstrateValidation => Ok(self.validate_substrate(ctx)),
            Step::ItemGate => {
                let base = ctx.requirement(0)?.item_code.clone();
                Ok(match self.check_items(ctx, &base, false).await? {
                    Some(hold) => StepOutcome::Held(hold),
                    None => StepOutcome::Advanced(Step::PurchaseOrder(0)),
                })
            }
            Step::PurchaseOrder(index) => self.purchase_order(ctx, index).await,
            Step::SalesOrder(index) => self.sales_order(ctx, index).await,
            Step::ShippingRequest(index) => self.shipping_request(ctx, index).await,
            Step::JobSiteB(index) => self.job_site_b(ctx, index).await,
            Step::Complete => Ok(StepOutcome::Terminal(Completion::Complete)),
        }
    }

    async fn load_order(&self, ctx: &mut OrderContext) -> Result<StepOutcome, StepError> {
        let lines = self.gateway.order_lines(ctx.order_id).await?;
        let first = lines
            .first()
            .ok_or_else(|| StepError::Data(format!("No site-A order lines found for order {}", ctx.order_id)))?;
        ctx.ids.base_item_code = Some(first.item_code.clone());

        let header = self.gateway.order_header(ctx.order_id).await?;
        ctx.customer_reference = header.customer_reference.unwrap_or_default().trim().to_string();
        if ctx.customer_reference.is_empty() {
            warn!(order_id = ctx.order_id, "Site-A customer reference is blank; site-B order reference will be blank");
        }

        info!(order_id = ctx.order_id, base_item = %first.item_code, lines = lines.len(), "Order accepted");
        ctx.lines = lines;
        Ok(StepOutcome::Advanced(Step::ItemGatePreJob))
    }

    async fn item_snapshot(&self, base: &str) -> Result<ItemSnapshot, GatewayError> {
        Ok(ItemSnapshot {
            base_code: base.trim().to_string(),
            base_status: self.gateway.item_status(base).await?,
            substrate_status: self
                .gateway
                .item_status(&derive_dependent(base, ItemKind::Substrate))
                .await?,
            finished_good_status: self
                .gateway
                .item_status(&derive_dependent(base, ItemKind::FinishedGood))
                .await?,
        })
    }

    /// Item gate; `Some` when the order has to stop here
    async fn check_items(
        &self,
        ctx: &OrderContext,
        base: &str,
        require_finished_good: bool,
    ) -> Result<Option<Hold>, StepError> {
        let snapshot = self.item_snapshot(base).await?;
        let decision = evaluate_item_gate(&snapshot, require_finished_good);
        info!(
            order_id = ctx.order_id,
            base = %snapshot.base_code,
            base_status = ?snapshot.base_status,
            substrate_status = ?snapshot.substrate_status,
            finished_good_status = ?snapshot.finished_good_status,
            require_finished_good,
            "Item gate"
        );

        let reason = decision.reason(&snapshot);
        let hold = match decision {
            ItemGateDecision::Pass => return Ok(None),
            ItemGateDecision::BaseNotApproved { .. } => Hold::new(HoldKind::BaseItemWait, reason),
            ItemGateDecision::CreateMissing(kinds) => {
                let core = core_of(base);
                let created = self.gateway.create_placeholder_items(&core, &kinds, ctx.order_id).await;
                match created.failure {
                    // Nothing exists yet, so this is an ordinary step failure
                    Some(e) if created.codes.is_empty() => return Err(e.into()),
                    Some(e) => {
                        warn!(
                            order_id = ctx.order_id,
                            items = ?created.codes,
                            error = %e,
                            "Only some placeholder items were created"
                        );
                        let reason = format!("{reason}; created {} before: {e}", created.codes.join(", "));
                        Hold::new(HoldKind::ItemCreateWait, reason)
                            .with_items(created.codes)
                            .with_api(e.api_failure().cloned())
                    }
                    None => {
                        info!(order_id = ctx.order_id, items = ?created.codes, "Placeholder items created in WAIT");
                        Hold::new(HoldKind::ItemCreateWait, reason).with_items(created.codes)
                    }
                }
            }
            ItemGateDecision::SubstrateNotApproved { .. } => Hold::new(HoldKind::SubstrateItemWait, reason),
            ItemGateDecision::FinishedGoodNotApproved { .. } => {
                Hold::new(HoldKind::FinishedGoodItemWait, reason)
            }
        };
        Ok(Some(hold))
    }

    /// Existence check, then create. A transient create failure is retried
    /// only after the existence check has been repeated.
    async fn find_or_create<T, U, F, FFut, C, CFut>(
        &self,
        operation: &'static str,
        mut find: F,
        mut create: C,
    ) -> Result<Located<T, U>, GatewayError>
    where
        F: FnMut() -> FFut,
        FFut: Future<Output = Result<Option<T>, GatewayError>>,
        C: FnMut() -> CFut,
        CFut: Future<Output = Result<U, GatewayError>>,
    {
        let attempts = self.config.create_attempts.max(1);
        let mut attempt = 1;
        loop {
            if let Some(existing) = find().await? {
                return Ok(Located::Existing(existing));
            }
            match create().await {
                Ok(created) => return Ok(Located::Created(created)),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(operation, attempt, error = %e, "Transient failure on create; re-checking before retry");
                    attempt += 1;
                    tokio::time::sleep(self.config.status_poll_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn job_site_a(&self, ctx: &mut OrderContext) -> Result<StepOutcome, StepError> {
        let gateway = &self.gateway;
        let order = ctx.order_id;
        let located = self
            .find_or_create(
                "create_job_site_a",
                move || gateway.find_existing_job(Site::SiteA, order),
                move || gateway.create_job_at_site(Site::SiteA, order),
            )
            .await;

        let job = match located {
            Ok(Located::Existing(job)) => {
                info!(order_id = order, job = %job, "Existing site-A job found (skip create)");
                job
            }
            Ok(Located::Created(result)) => {
                if let Some(errors) = result.errors {
                    return Ok(StepOutcome::Held(Hold::new(HoldKind::JobSiteAHold, errors)));
                }
                match result.job_code {
                    Some(job) => job,
                    None => {
                        return Ok(StepOutcome::Failed(Failure::new(
                            Step::JobSiteA,
                            format!("JOB_P4 did not produce a Job Code. {}", result.summary),
                        )))
                    }
                }
            }
            Err(GatewayError::Domain(failure)) => {
                let reason = failure.message.clone();
                return Ok(StepOutcome::Held(
                    Hold::new(HoldKind::JobSiteAHold, reason).with_api(Some(failure)),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        ctx.ids.job_site_a = Some(job);
        Ok(StepOutcome::Advanced(Step::RequirementsSiteA))
    }

    async fn load_requirements(&self, ctx: &mut OrderContext) -> Result<StepOutcome, StepError> {
        let job = ctx.job_site_a()?.to_string();
        let requirements = self.gateway.requirements(&job).await?;
        if requirements.is_empty() {
            return Ok(StepOutcome::Failed(Failure::new(
                Step::RequirementsSiteA,
                format!("No eligible requirement rows found for Job {job}"),
            )));
        }
        info!(order_id = ctx.order_id, job = %job, count = requirements.len(), "Requirements loaded");
        ctx.requirements = requirements;
        Ok(StepOutcome::Advanced(Step::SubstrateValidation))
    }

    fn validate_substrate(&self, ctx: &OrderContext) -> StepOutcome {
        let Some(base) = ctx.ids.base_item_code.as_deref() else {
            return StepOutcome::Advanced(Step::ItemGate);
        };
        let items: Vec<&str> = std::iter::once(base)
            .chain(ctx.requirements.iter().map(|r| r.item_code.as_str()))
            .collect();

        match validate_printed_substrate(base, &items) {
            Ok(()) => StepOutcome::Advanced(Step::ItemGate),
            Err(mismatch) => StepOutcome::Failed(Failure {
                step: Step::SubstrateValidation,
                message: mismatch.to_string(),
                api: None,
                substrate: Some(mismatch),
            }),
        }
    }

    async fn purchase_order(&self, ctx: &mut OrderContext, index: usize) -> Result<StepOutcome, StepError> {
        let requirement = ctx.requirement(index)?.clone();
        let job = ctx.job_site_a()?.to_string();
        let request = PurchaseOrderRequest {
            job_code: job.clone(),
            item_code: requirement.item_code.clone(),
            quantity: requirement.required_qty,
            dim_a: requirement.dim_a,
            required_date: requirement.required_date,
        };

        let gateway = &self.gateway;
        let (job_ref, request_ref) = (job.as_str(), &request);
        let po_number = match self
            .find_or_create(
                "create_purchase_order",
                move || gateway.find_purchase_order_by_job(job_ref),
                move || gateway.create_purchase_order(request_ref),
            )
            .await?
        {
            Located::Existing(po) => {
                info!(order_id = ctx.order_id, job = %job, po, "Existing purchase order found (skip create)");
                po
            }
            Located::Created(po) => po,
        };

        ctx.ids.po_number = Some(po_number);
        self.store
            .record_po_mapping(&PoMapping {
                order_id: ctx.order_id,
                item_code: requirement.item_code,
                po_number,
                po_line: 1,
                sales_order_site_b: None,
                so_line: None,
                shipping_request: None,
            })
            .await?;
        Ok(StepOutcome::Advanced(Step::SalesOrder(index)))
    }

    /// Poll until the site-B order is visible or the attempts run out
    async fn poll_sales_order(&self, sales_order: i64) -> Result<Option<i64>, GatewayError> {
        let attempts = self.config.status_poll_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(status) = self.gateway.poll_status(sales_order).await? {
                return Ok(Some(status));
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.status_poll_delay()).await;
            }
        }
        Ok(None)
    }

    async fn sales_order(&self, ctx: &mut OrderContext, index: usize) -> Result<StepOutcome, StepError> {
        let requirement = ctx.requirement(index)?.clone();
        if let Some(hold) = self.check_items(ctx, &requirement.item_code, true).await? {
            return Ok(StepOutcome::Held(hold));
        }

        let po_number = ctx.po_number()?;
        let request = SalesOrderRequest {
            po_number,
            item_code: derive_dependent(&requirement.item_code, ItemKind::FinishedGood),
            quantity: requirement.required_qty,
            required_date: requirement.required_date,
            customer_reference: ctx.customer_reference.clone(),
        };

        let gateway = &self.gateway;
        let request_ref = &request;
        let sales_order = match self
            .find_or_create(
                "create_sales_order",
                move || gateway.find_sales_order_by_po(po_number),
                move || gateway.create_sales_order(request_ref),
            )
            .await?
        {
            Located::Existing(so) => {
                info!(order_id = ctx.order_id, po_number, sales_order = so, "Existing site-B order found (skip create)");
                so
            }
            Located::Created(so) => so,
        };

        ctx.ids.sales_order_site_b = Some(sales_order);
        self.store
            .record_po_mapping(&PoMapping {
                order_id: ctx.order_id,
                item_code: requirement.item_code.clone(),
                po_number,
                po_line: 1,
                sales_order_site_b: Some(sales_order),
                so_line: Some(1),
                shipping_request: None,
            })
            .await?;

        self.gateway.force_authorize(sales_order).await?;
        let status = self.poll_sales_order(sales_order).await?;
        info!(order_id = ctx.order_id, sales_order, status = ?status, "Site-B order status after force authorize");

        match status {
            Some(SO_AUTHORIZED) => {
                self.gateway.confirm_purchase_order(po_number).await?;
                Ok(StepOutcome::Advanced(Step::ShippingRequest(index)))
            }
            Some(SO_COMPLETE) => {
                self.gateway.confirm_purchase_order(po_number).await?;
                info!(order_id = ctx.order_id, sales_order, "Site-B order already complete; no site-B job needed");
                Ok(StepOutcome::Terminal(Completion::AlreadyComplete))
            }
            Some(held @ (SO_HELD | SO_CREDIT_HELD)) => Ok(StepOutcome::Held(Hold::new(
                HoldKind::SalesOrderStatusHold,
                format!("Site-B SO {sales_order} is not authorized (status={held})."),
            ))),
            other => {
                warn!(
                    order_id = ctx.order_id,
                    sales_order,
                    status = ?other,
                    po_number,
                    "Site-B order status unknown after polling; continuing without confirming the purchase order"
                );
                Ok(StepOutcome::Advanced(Step::ShippingRequest(index)))
            }
        }
    }

    async fn shipping_request(&self, ctx: &mut OrderContext, index: usize) -> Result<StepOutcome, StepError> {
        let sales_order = ctx.sales_order()?;
        let gateway = &self.gateway;
        let located = self
            .find_or_create(
                "create_shipping_request",
                move || gateway.find_shipping_request(sales_order),
                move || gateway.create_shipping_request(sales_order),
            )
            .await;

        let shipping_request = match located {
            Ok(Located::Existing(number)) => {
                info!(order_id = ctx.order_id, sales_order, shipping_request = %number, "Existing shipping request found (skip create)");
                Some(number)
            }
            Ok(Located::Created(number)) => {
                if number.is_none() {
                    warn!(order_id = ctx.order_id, sales_order, "Shipping request accepted without a number");
                }
                number
            }
            Err(e @ GatewayError::LinesNotVisible { .. }) => {
                return Ok(StepOutcome::Held(Hold::new(HoldKind::ShippingLinesWait, e.to_string())));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(number) = shipping_request {
            ctx.ids.shipping_request = Some(number.clone());
            let requirement = ctx.requirement(index)?;
            self.store
                .record_po_mapping(&PoMapping {
                    order_id: ctx.order_id,
                    item_code: requirement.item_code.clone(),
                    po_number: ctx.po_number()?,
                    po_line: 1,
                    sales_order_site_b: Some(sales_order),
                    so_line: Some(1),
                    shipping_request: Some(number),
                })
                .await?;
        }
        Ok(StepOutcome::Advanced(Step::JobSiteB(index)))
    }

    async fn job_site_b(&self, ctx: &mut OrderContext, index: usize) -> Result<StepOutcome, StepError> {
        let sales_order = ctx.sales_order()?;
        let gateway = &self.gateway;
        let located = self
            .find_or_create(
                "create_job_site_b",
                move || gateway.find_existing_job(Site::SiteB, sales_order),
                move || gateway.create_job_at_site(Site::SiteB, sales_order),
            )
            .await;

        let job = match located {
            Ok(Located::Existing(job)) => {
                info!(order_id = ctx.order_id, sales_order, job = %job, "Existing site-B job found (skip create)");
                job
            }
            Ok(Located::Created(result)) => match result.job_code {
                Some(job) if result.errors.is_none() => job,
                _ => {
                    let detail = result.errors.unwrap_or(result.summary);
                    let message = format!("JOB_P2 did not produce a Job Code: {detail}");
                    return Ok(site_b_job_rejection(index, message, None));
                }
            },
            Err(GatewayError::Domain(failure)) => {
                let message = failure.message.clone();
                return Ok(site_b_job_rejection(index, message, Some(failure)));
            }
            Err(e) => return Err(e.into()),
        };

        ctx.ids.job_site_b = Some(job);
        let next = if index + 1 < ctx.requirements.len() {
            Step::PurchaseOrder(index + 1)
        } else {
            Step::Complete
        };
        Ok(StepOutcome::Advanced(next))
    }

    async fn hold(&self, ctx: &OrderContext, hold: Hold) -> Result<OrderOutcome, StoreError> {
        let tag = hold.kind.tag();
        let mut update = ctx.update(OrderStatus::Hold, tag).error(hold.reason.clone());
        if let Some(api) = &hold.api {
            update = update.api(ApiDiagnostics::from(api));
        }
        self.store.record_progress(&update).await?;
        self.store
            .mark_run_order(&ctx.run_id, ctx.order_id, RunOrderStatus::Hold, tag)
            .await?;
        info!(order_id = ctx.order_id, step = tag, reason = %hold.reason, "Order on HOLD");

        self.notifications
            .items_created(ctx.order_id, &hold.created_items, &hold.reason)
            .await;
        Ok(OrderOutcome::Held(hold))
    }

    async fn fail(&self, ctx: &OrderContext, failure: Failure) -> Result<OrderOutcome, StoreError> {
        let tag = failure.step.tag();
        let mut update = ctx.update(OrderStatus::Failed, tag).error(failure.message.clone());
        if let Some(api) = failure.diagnostics() {
            update = update.api(api);
        }
        self.store.record_progress(&update).await?;
        self.store
            .mark_run_order(&ctx.run_id, ctx.order_id, RunOrderStatus::Failed, tag)
            .await?;
        error!(order_id = ctx.order_id, step = %failure.step, message = %failure.message, "Order FAILED");

        match &failure.substrate {
            Some(mismatch) => {
                self.notifications
                    .substrate_mismatch(&self.store, ctx.order_id, tag, mismatch)
                    .await?;
            }
            None => {
                self.notifications
                    .order_failed(&self.store, ctx.order_id, tag, &failure.message, failure.api.as_ref())
                    .await?;
            }
        }
        Ok(OrderOutcome::Failed(failure))
    }

    async fn complete(&self, ctx: &OrderContext, completion: Completion) -> Result<OrderOutcome, StoreError> {
        let tag = completion.tag();
        self.store
            .record_progress(&ctx.update(OrderStatus::Complete, tag))
            .await?;
        self.store
            .mark_run_order(&ctx.run_id, ctx.order_id, RunOrderStatus::Complete, tag)
            .await?;

        if !ctx.lines.is_empty() {
            self.store
                .replace_line_snapshots(ctx.order_id, &line_baseline(&ctx.lines))
                .await?;
        }
        self.store
            .save_header_snapshot(ctx.order_id, &ctx.customer_reference)
            .await?;
        if !ctx.requirements.is_empty() {
            self.store
                .replace_requirement_snapshots(ctx.order_id, &requirement_baseline(&ctx.requirements))
                .await?;
        }

        info!(
            order_id = ctx.order_id,
            step = tag,
            job_site_a = ?ctx.ids.job_site_a,
            po_number = ?ctx.ids.po_number,
            sales_order = ?ctx.ids.sales_order_site_b,
            shipping_request = ?ctx.ids.shipping_request,
            job_site_b = ?ctx.ids.job_site_b,
            "Order COMPLETE"
        );
        Ok(OrderOutcome::Completed(completion))
    }
}

/// Site-B job rejections that mean "wait" are holds, everything else fails
fn site_b_job_rejection(index: usize, message: String, api: Option<ApiFailure>) -> StepOutcome {
    if is_site_b_job_hold(&message) {
        StepOutcome::Held(Hold::new(HoldKind::JobSiteBOnHold, message).with_api(api))
    } else {
        StepOutcome::Failed(Failure {
            step: Step::JobSiteB(index),
            message,
            api,
            substrate: None,
        })
    }
}
