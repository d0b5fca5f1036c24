//! Typed access to the remote order system.
//!
//! Reads go through parameterised SQL against the remote databases; writes go
//! through the XLink envelope API. Callers see plain records and a single
//! error type. The gateway never deduplicates: every create call reaches the
//! remote system, so callers check for existing artifacts first.

pub mod client;
pub mod envelope;
pub mod erp;
pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod payloads;
pub mod query;
pub mod retry;
pub mod rows;
pub mod sql;
pub mod types;

pub use client::XLinkClient;
pub use erp::ErpGateway;
pub use errors::{ApiFailure, GatewayError};
pub use query::{AnyQueryExecutor, QueryExecutor, SqlParam};
pub use retry::RetryConfig;
pub use rows::Row;
pub use types::{
    CreatedItems, JobCreationResult, LineQuantityUpdate, OrderHeader, OrderLine, PurchaseOrderRequest, Requirement,
    SalesOrderRequest, Site,
};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::gates::ItemKind;

#[async_trait]
pub trait RemoteOrderGateway: Send + Sync {
    // Reads. Side-effect free and safe to repeat.

    /// Site-A orders eligible for the workflow, newest first
    async fn find_eligible_orders(&self, start_date: NaiveDate, limit: usize) -> Result<Vec<i64>, GatewayError>;

    async fn is_eligible_order(&self, order: i64) -> Result<bool, GatewayError>;

    /// Site-A order lines
    async fn order_lines(&self, order: i64) -> Result<Vec<OrderLine>, GatewayError>;

    async fn order_header(&self, order: i64) -> Result<OrderHeader, GatewayError>;

    /// Item status code, or `None` when the item does not exist
    async fn item_status(&self, item_code: &str) -> Result<Option<String>, GatewayError>;

    /// Job already linked to an order at a site (site-B orders for [`Site::SiteB`])
    async fn find_existing_job(&self, site: Site, order: i64) -> Result<Option<String>, GatewayError>;

    /// Open, unreserved film requirements of a site-A job
    async fn requirements(&self, job: &str) -> Result<Vec<Requirement>, GatewayError>;

    /// All live film requirements of a site-A job
    async fn current_requirements(&self, job: &str) -> Result<Vec<Requirement>, GatewayError>;

    async fn find_purchase_order_by_job(&self, job: &str) -> Result<Option<i64>, GatewayError>;

    async fn find_sales_order_by_po(&self, po_number: i64) -> Result<Option<i64>, GatewayError>;

    /// Current site-B order status, if the read side can see the order yet
    async fn poll_status(&self, sales_order: i64) -> Result<Option<i64>, GatewayError>;

    async fn find_shipping_request(&self, sales_order: i64) -> Result<Option<String>, GatewayError>;

    /// Site-B order lines
    async fn line_status(&self, sales_order: i64) -> Result<Vec<OrderLine>, GatewayError>;

    /// Ordered quantity on the first line of a site-B job
    async fn job_line_quantity(&self, job: &str) -> Result<Option<f64>, GatewayError>;

    // Writes. Each call reaches the remote system.

    /// Create the missing dependent items of `core` in WAIT status.
    ///
    /// Creation stops at the first failure; the codes created before it are
    /// still reported.
    async fn create_placeholder_items(&self, core: &str, kinds: &[ItemKind], order: i64) -> CreatedItems;

    async fn create_job_at_site(&self, site: Site, order: i64) -> Result<JobCreationResult, GatewayError>;

    async fn create_purchase_order(&self, request: &PurchaseOrderRequest) -> Result<i64, GatewayError>;

    async fn create_sales_order(&self, request: &SalesOrderRequest) -> Result<i64, GatewayError>;

    /// Shipping request for a site-B order; `None` when the remote accepted
    /// the request without echoing a number
    async fn create_shipping_request(&self, sales_order: i64) -> Result<Option<String>, GatewayError>;

    /// Reset a site-B order to authorized
    async fn force_authorize(&self, sales_order: i64) -> Result<(), GatewayError>;

    async fn confirm_purchase_order(&self, po_number: i64) -> Result<(), GatewayError>;

    async fn update_line_quantity(&self, update: &LineQuantityUpdate) -> Result<(), GatewayError>;

    async fn update_order_reference(&self, sales_order: i64, reference: &str) -> Result<(), GatewayError>;

    /// Run the batch price import; `false` on any problem
    async fn trigger_price_update(&self) -> bool;

    /// Point newly created items at their own price codes
    async fn apply_price_codes(&self, items: &[String]) -> Result<(), GatewayError>;
}
