use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

use super::StoreError;

/// Lifecycle of an order inside the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderStatus {
    #[default]
    New,
    InProgress,
    Hold,
    Failed,
    Complete,
    Removed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Hold => "HOLD",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Complete => "COMPLETE",
            OrderStatus::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "IN_PROGRESS" => Ok(OrderStatus::InProgress),
            "HOLD" => Ok(OrderStatus::Hold),
            "FAILED" => Ok(OrderStatus::Failed),
            "COMPLETE" => Ok(OrderStatus::Complete),
            "REMOVED" => Ok(OrderStatus::Removed),
            other => Err(StoreError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of one order within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrderStatus {
    InProgress,
    Skipped,
    Hold,
    Failed,
    Complete,
}

impl RunOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOrderStatus::InProgress => "IN_PROGRESS",
            RunOrderStatus::Skipped => "SKIPPED",
            RunOrderStatus::Hold => "HOLD",
            RunOrderStatus::Failed => "FAILED",
            RunOrderStatus::Complete => "COMPLETE",
        }
    }
}

impl FromStr for RunOrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(RunOrderStatus::InProgress),
            "SKIPPED" => Ok(RunOrderStatus::Skipped),
            "HOLD" => Ok(RunOrderStatus::Hold),
            "FAILED" => Ok(RunOrderStatus::Failed),
            "COMPLETE" => Ok(RunOrderStatus::Complete),
            other => Err(StoreError::InvalidValue {
                field: "run_orders.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Identifiers of the downstream artifacts created for an order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedIds {
    pub base_item_code: Option<String>,
    pub job_site_a: Option<String>,
    pub po_number: Option<i64>,
    pub sales_order_site_b: Option<i64>,
    pub shipping_request: Option<String>,
    pub job_site_b: Option<String>,
}

/// Remote response details kept alongside a failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDiagnostics {
    pub entity: Option<String>,
    pub status: Option<i64>,
    pub message: Option<String>,
    pub messages: Vec<String>,
    pub raw: Option<String>,
}

/// Persisted state of one order
#[derive(Debug, Clone, Default)]
pub struct OrderState {
    pub order_id: i64,
    pub status: OrderStatus,
    pub last_step: String,
    pub last_run_id: Option<String>,
    pub ids: DerivedIds,
    pub last_error_summary: Option<String>,
    pub api: ApiDiagnostics,
    /// Start of the current hold episode. A run re-evaluating a held order
    /// passes through IN_PROGRESS; the value is kept there so landing on the
    /// same hold step again keeps the clock. Every other non-HOLD status
    /// clears it.
    pub hold_since: Option<DateTime<Utc>>,
    pub last_reminder_sent: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub last_failure_signature: Option<String>,
    pub last_substrate_signature: Option<String>,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One progress write for an order.
///
/// Identifier fields left as `None` keep whatever the store already holds.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order_id: i64,
    pub status: OrderStatus,
    pub last_step: String,
    pub run_id: Option<String>,
    pub ids: DerivedIds,
    pub error_summary: Option<String>,
    pub api: Option<ApiDiagnostics>,
}

impl OrderUpdate {
    pub fn new(order_id: i64, status: OrderStatus, last_step: impl Into<String>) -> Self {
        Self {
            order_id,
            status,
            last_step: last_step.into(),
            run_id: None,
            ids: DerivedIds::default(),
            error_summary: None,
            api: None,
        }
    }

    pub fn run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn ids(mut self, ids: DerivedIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn error(mut self, summary: impl Into<String>) -> Self {
        self.error_summary = Some(summary.into());
        self
    }

    pub fn api(mut self, api: ApiDiagnostics) -> Self {
        self.api = Some(api);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunCounts {
    pub eligible: i64,
    pub processed: i64,
    pub held: i64,
    pub failed: i64,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub env: String,
    pub host: Option<String>,
    pub counts: RunCounts,
}

#[derive(Debug, Clone)]
pub struct RunOrderRecord {
    pub run_id: String,
    pub order_id: i64,
    pub status: RunOrderStatus,
    pub last_step: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Site-A order line as last applied downstream
#[derive(Debug, Clone, PartialEq)]
pub struct LineSnapshot {
    pub line_number: i64,
    pub item_code: String,
    pub quantity: f64,
    pub required_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderSnapshot {
    pub customer_reference: String,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Site-A job requirement as last propagated to site B
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementSnapshot {
    pub item_code: String,
    pub quantity: f64,
    pub required_date: Option<NaiveDate>,
}

/// Links a site-A requirement to the purchase order line and site-B lines created for it
#[derive(Debug, Clone, PartialEq)]
pub struct PoMapping {
    pub order_id: i64,
    pub item_code: String,
    pub po_number: i64,
    pub po_line: i64,
    pub sales_order_site_b: Option<i64>,
    pub so_line: Option<i64>,
    pub shipping_request: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    pub order_id: i64,
    pub run_id: Option<String>,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ChangeLogEntry {
    pub fn new(
        order_id: i64,
        run_id: Option<&str>,
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            order_id,
            run_id: run_id.map(str::to_string),
            field: field.into(),
            old_value,
            new_value,
            recorded_at: None,
        }
    }
}

/// Which de-duplication slot a notification signature occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureSlot {
    Failure,
    SubstrateMismatch,
}
