//! In-memory remote order system for tests.
//!
//! Ids are deterministic: site-A jobs are `P4J-{order}`, site-B jobs
//! `P2J-{sales order}`, purchase orders count up from 5001, sales orders from
//! 7001 and shipping requests are `SR-{sales order}`. Every write is recorded.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::errors::{ApiFailure, GatewayError};
use super::types::{
    CreatedItems, JobCreationResult, LineQuantityUpdate, OrderHeader, OrderLine, PurchaseOrderRequest, Requirement,
    SalesOrderRequest, Site,
};
use super::RemoteOrderGateway;
use crate::gates::{derive_dependent, ItemKind};

/// A write the fake received, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCall {
    CreateItems { core: String, kinds: Vec<ItemKind>, order: i64 },
    CreateJob { site: Site, order: i64 },
    CreatePurchaseOrder(PurchaseOrderRequest),
    CreateSalesOrder(SalesOrderRequest),
    CreateShippingRequest(i64),
    ForceAuthorize(i64),
    ConfirmPurchaseOrder(i64),
    UpdateLineQuantity(LineQuantityUpdate),
    UpdateOrderReference { sales_order: i64, reference: String },
    PriceUpdate,
    ApplyPriceCodes(Vec<String>),
}

#[derive(Debug)]
pub struct FakeState {
    pub eligible: Vec<i64>,
    pub order_lines: HashMap<i64, Vec<OrderLine>>,
    pub customer_references: HashMap<i64, String>,
    /// Item code to status code
    pub items: HashMap<String, String>,
    pub jobs: HashMap<(Site, i64), String>,
    /// Scripted job-creation answers; consumed on use
    pub job_results: HashMap<(Site, i64), JobCreationResult>,
    pub requirements: HashMap<String, Vec<Requirement>>,
    pub po_by_job: HashMap<String, i64>,
    pub so_by_po: HashMap<i64, i64>,
    pub so_status: HashMap<i64, i64>,
    /// Status given to newly created sales orders; `None` leaves them unreadable
    pub new_so_status: Option<i64>,
    pub so_lines: HashMap<i64, Vec<OrderLine>>,
    /// Sales orders whose lines the read side cannot see
    pub hidden_lines: HashSet<i64>,
    pub shipping_requests: HashMap<i64, String>,
    pub job_line_quantities: HashMap<String, f64>,
    /// Operation name to remaining transient failures
    pub transient_failures: HashMap<&'static str, u32>,
    /// Item kinds whose creation is refused
    pub refused_item_kinds: HashSet<ItemKind>,
    /// Operation name to a refusal returned once
    pub refusals: HashMap<&'static str, ApiFailure>,
    pub price_update_succeeds: bool,
    pub writes: Vec<WriteCall>,
    next_po: i64,
    next_so: i64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            eligible: Vec::new(),
            order_lines: HashMap::new(),
            customer_references: HashMap::new(),
            items: HashMap::new(),
            jobs: HashMap::new(),
            job_results: HashMap::new(),
            requirements: HashMap::new(),
            po_by_job: HashMap::new(),
            so_by_po: HashMap::new(),
            so_status: HashMap::new(),
            new_so_status: Some(0),
            so_lines: HashMap::new(),
            hidden_lines: HashSet::new(),
            shipping_requests: HashMap::new(),
            job_line_quantities: HashMap::new(),
            transient_failures: HashMap::new(),
            refused_item_kinds: HashSet::new(),
            refusals: HashMap::new(),
            price_update_succeeds: true,
            writes: Vec::new(),
            next_po: 5000,
            next_so: 7000,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeErp {
    state: Mutex<FakeState>,
}

pub fn line(line_number: i64, item_code: &str, ordered_qty: f64) -> OrderLine {
    OrderLine {
        line_number,
        item_code: item_code.to_string(),
        ordered_qty,
        required_date: NaiveDate::from_ymd_opt(2026, 3, 2),
    }
}

pub fn requirement(job: &str, item_code: &str, required_qty: f64) -> Requirement {
    Requirement {
        requirement_id: None,
        job_code: job.to_string(),
        item_code: item_code.to_string(),
        required_qty,
        required_date: NaiveDate::from_ymd_opt(2026, 3, 2),
        dim_a: 12.5,
        order_line: Some(1),
    }
}

pub fn refusal(entity: &str, message: &str) -> ApiFailure {
    ApiFailure {
        entity: entity.to_string(),
        status: Some(9),
        message: message.to_string(),
        messages: vec![message.to_string()],
        raw: String::new(),
    }
}

impl FakeErp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// An eligible site-A order with one line for `base_item`
    pub fn with_order(self, order: i64, base_item: &str, quantity: f64, reference: &str) -> Self {
        {
            let mut state = self.state();
            state.eligible.push(order);
            state.order_lines.insert(order, vec![line(1, base_item, quantity)]);
            state.customer_references.insert(order, reference.to_string());
        }
        self
    }

    pub fn with_item(self, code: &str, status: &str) -> Self {
        self.state().items.insert(code.to_string(), status.to_string());
        self
    }

    /// Base item plus both dependents, all approved
    pub fn with_approved_items(self, base_item: &str) -> Self {
        let this = self.with_item(base_item, "APP");
        let substrate = derive_dependent(base_item, ItemKind::Substrate);
        let finished = derive_dependent(base_item, ItemKind::FinishedGood);
        this.with_item(&substrate, "APP").with_item(&finished, "APP")
    }

    /// Requirements served for the site-A job of `order`
    pub fn with_requirements(self, order: i64, requirements: &[(&str, f64)]) -> Self {
        let job = format!("P4J-{order}");
        let rows = requirements
            .iter()
            .map(|(item, qty)| requirement(&job, item, *qty))
            .collect();
        self.state().requirements.insert(job, rows);
        self
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.state().writes.clone()
    }

    pub fn count_writes(&self, matches: impl Fn(&WriteCall) -> bool) -> usize {
        self.state().writes.iter().filter(|w| matches(w)).count()
    }

    fn check(&self, operation: &'static str) -> Result<(), GatewayError> {
        let mut state = self.state();
        if let Some(remaining) = state.transient_failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::Transport {
                    entity: operation.to_string(),
                    status: Some(503),
                    message: "service unavailable".to_string(),
                    transient: true,
                });
            }
        }
        match state.refusals.remove(operation) {
            Some(failure) => Err(GatewayError::Domain(failure)),
            None => Ok(()),
        }
    }

    fn record(&self, call: WriteCall) {
        self.state().writes.push(call);
    }
}

#[async_trait]
impl RemoteOrderGateway for FakeErp {
    async fn find_eligible_orders(&self, _start_date: NaiveDate, limit: usize) -> Result<Vec<i64>, GatewayError> {
        self.check("find_eligible_orders")?;
        let mut orders = self.state().eligible.clone();
        orders.sort_unstable_by(|a, b| b.cmp(a));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn is_eligible_order(&self, order: i64) -> Result<bool, GatewayError> {
        self.check("is_eligible_order")?;
        Ok(self.state().eligible.contains(&order))
    }

    async fn order_lines(&self, order: i64) -> Result<Vec<OrderLine>, GatewayError> {
        self.check("order_lines")?;
        Ok(self.state().order_lines.get(&order).cloned().unwrap_or_default())
    }

    async fn order_header(&self, order: i64) -> Result<OrderHeader, GatewayError> {
        self.check("order_header")?;
        Ok(OrderHeader {
            order_id: order,
            customer_reference: self.state().customer_references.get(&order).cloned(),
        })
    }

    async fn item_status(&self, item_code: &str) -> Result<Option<String>, GatewayError> {
        self.check("item_status")?;
        Ok(self.state().items.get(item_code).cloned())
    }

    async fn find_existing_job(&self, site: Site, order: i64) -> Result<Option<String>, GatewayError> {
        self.check("find_existing_job")?;
        Ok(self.state().jobs.get(&(site, order)).cloned())
    }

    async fn requirements(&self, job: &str) -> Result<Vec<Requirement>, GatewayError> {
        self.check("requirements")?;
        Ok(self.state().requirements.get(job).cloned().unwrap_or_default())
    }

    async fn current_requirements(&self, job: &str) -> Result<Vec<Requirement>, GatewayError> {
        self.check("current_requirements")?;
        Ok(self.state().requirements.get(job).cloned().unwrap_or_default())
    }

    async fn find_purchase_order_by_job(&self, job: &str) -> Result<Option<i64>, GatewayError> {
        self.check("find_purchase_order_by_job")?;
        Ok(self.state().po_by_job.get(job).copied())
    }

    async fn find_sales_order_by_po(&self, po_number: i64) -> Result<Option<i64>, GatewayError> {
        self.check("find_sales_order_by_po")?;
        Ok(self.state().so_by_po.get(&po_number).copied())
    }

    async fn poll_status(&self, sales_order: i64) -> Result<Option<i64>, GatewayError> {
        self.check("poll_status")?;
        Ok(self.state().so_status.get(&sales_order).copied())
    }

    async fn find_shipping_request(&self, sales_order: i64) -> Result<Option<String>, GatewayError> {
        self.check("find_shipping_request")?;
        Ok(self.state().shipping_requests.get(&sales_order).cloned())
    }

    async fn line_status(&self, sales_order: i64) -> Result<Vec<OrderLine>, GatewayError> {
        self.check("line_status")?;
        let state = self.state();
        if state.hidden_lines.contains(&sales_order) {
            return Ok(Vec::new());
        }
        Ok(state.so_lines.get(&sales_order).cloned().unwrap_or_default())
    }

    async fn job_line_quantity(&self, job: &str) -> Result<Option<f64>, GatewayError> {
        self.check("job_line_quantity")?;
        Ok(self.state().job_line_quantities.get(job).copied())
    }

    async fn create_placeholder_items(&self, core: &str, kinds: &[ItemKind], order: i64) -> CreatedItems {
        let mut created = CreatedItems::default();
        if let Err(e) = self.check("create_placeholder_items") {
            created.failure = Some(e);
            return created;
        }
        self.record(WriteCall::CreateItems {
            core: core.to_string(),
            kinds: kinds.to_vec(),
            order,
        });
        let mut state = self.state();
        for kind in kinds {
            let code = derive_dependent(core, *kind);
            if state.refused_item_kinds.contains(kind) {
                let failure = refusal("XLinkAPIItem", &format!("Item {code} could not be created"));
                created.failure = Some(GatewayError::Domain(failure));
                break;
            }
            state.items.insert(code.clone(), "WAIT".to_string());
            created.codes.push(code);
        }
        created
    }

    async fn create_job_at_site(&self, site: Site, order: i64) -> Result<JobCreationResult, GatewayError> {
        self.check("create_job_at_site")?;
        self.record(WriteCall::CreateJob { site, order });
        let mut state = self.state();
        if let Some(scripted) = state.job_results.remove(&(site, order)) {
            if let Some(job) = &scripted.job_code {
                state.jobs.insert((site, order), job.clone());
            }
            return Ok(scripted);
        }

        let job = match site {
            Site::SiteA => format!("P4J-{order}"),
            Site::SiteB => format!("P2J-{order}"),
        };
        if site == Site::SiteB {
            let quantity = state
                .so_lines
                .get(&order)
                .and_then(|lines| lines.first())
                .map(|l| l.ordered_qty);
            if let Some(quantity) = quantity {
                state.job_line_quantities.insert(job.clone(), quantity);
            }
        }
        state.jobs.insert((site, order), job.clone());
        Ok(JobCreationResult {
            job_code: Some(job),
            errors: None,
            summary: String::new(),
        })
    }

    async fn create_purchase_order(&self, request: &PurchaseOrderRequest) -> Result<i64, GatewayError> {
        self.check("create_purchase_order")?;
        self.record(WriteCall::CreatePurchaseOrder(request.clone()));
        let mut state = self.state();
        state.next_po += 1;
        let po_number = state.next_po;
        state.po_by_job.insert(request.job_code.clone(), po_number);
        Ok(po_number)
    }

    async fn create_sales_order(&self, request: &SalesOrderRequest) -> Result<i64, GatewayError> {
        self.check("create_sales_order")?;
        self.record(WriteCall::CreateSalesOrder(request.clone()));
        let mut state = self.state();
        state.next_so += 1;
        let sales_order = state.next_so;
        state.so_by_po.insert(request.po_number, sales_order);
        if let Some(status) = state.new_so_status {
            state.so_status.insert(sales_order, status);
        }
        state.so_lines.insert(
            sales_order,
            vec![OrderLine {
                line_number: 1,
                item_code: request.item_code.clone(),
                ordered_qty: request.quantity,
                required_date: request.required_date,
            }],
        );
        Ok(sales_order)
    }

    async fn create_shipping_request(&self, sales_order: i64) -> Result<Option<String>, GatewayError> {
        self.check("create_shipping_request")?;
        self.record(WriteCall::CreateShippingRequest(sales_order));
        let mut state = self.state();
        if state.hidden_lines.contains(&sales_order) {
            return Err(GatewayError::LinesNotVisible { sales_order });
        }
        let number = format!("SR-{sales_order}");
        state.shipping_requests.insert(sales_order, number.clone());
        Ok(Some(number))
    }

    async fn force_authorize(&self, sales_order: i64) -> Result<(), GatewayError> {
        self.check("force_authorize")?;
        self.record(WriteCall::ForceAuthorize(sales_order));
        Ok(())
    }

    async fn confirm_purchase_order(&self, po_number: i64) -> Result<(), GatewayError> {
        self.check("confirm_purchase_order")?;
        self.record(WriteCall::ConfirmPurchaseOrder(po_number));
        Ok(())
    }

    async fn update_line_quantity(&self, update: &LineQuantityUpdate) -> Result<(), GatewayError> {
        self.check("update_line_quantity")?;
        self.record(WriteCall::UpdateLineQuantity(update.clone()));
        if let LineQuantityUpdate::SalesOrder {
            sales_order,
            line,
            quantity,
            ..
        } = update
        {
            let mut state = self.state();
            if let Some(existing) = state
                .so_lines
                .get_mut(sales_order)
                .and_then(|lines| lines.iter_mut().find(|l| l.line_number == *line))
            {
                existing.ordered_qty = *quantity;
            }
        }
        Ok(())
    }

    async fn update_order_reference(&self, sales_order: i64, reference: &str) -> Result<(), GatewayError> {
        self.check("update_order_reference")?;
        self.record(WriteCall::UpdateOrderReference {
            sales_order,
            reference: reference.to_string(),
        });
        Ok(())
    }

    async fn trigger_price_update(&self) -> bool {
        self.record(WriteCall::PriceUpdate);
        self.state().price_update_succeeds
    }

    async fn apply_price_codes(&self, items: &[String]) -> Result<(), GatewayError> {
        self.check("apply_price_codes")?;
        self.record(WriteCall::ApplyPriceCodes(items.to_vec()));
        Ok(())
    }
}
