use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::GatewayError;
use super::rows::Row;

/// One of the two manufacturing sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    /// Raw-material site: job, requirements and purchase orders
    SiteA,
    /// Finished-goods site: sales order, shipping request and job
    SiteB,
}

impl Site {
    pub fn plant_code(&self) -> &'static str {
        match self {
            Site::SiteA => "4",
            Site::SiteB => "2",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plant {}", self.plant_code())
    }
}

/// A sales-order line at either site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_number: i64,
    pub item_code: String,
    pub ordered_qty: f64,
    pub required_date: Option<NaiveDate>,
}

impl OrderLine {
    pub(crate) fn from_row(row: &Row) -> Result<Self, GatewayError> {
        Ok(Self {
            line_number: row.int("SOrderLineNum").unwrap_or(1),
            item_code: row.require_text("order line", "ItemCode")?,
            ordered_qty: row.float("OrderedQty").unwrap_or(0.0),
            required_date: row.date("ReqDate"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub order_id: i64,
    pub customer_reference: Option<String>,
}

/// An open material requirement of a site-A job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub requirement_id: Option<i64>,
    pub job_code: String,
    pub item_code: String,
    pub required_qty: f64,
    pub required_date: Option<NaiveDate>,
    pub dim_a: f64,
    pub order_line: Option<i64>,
}

impl Requirement {
    pub(crate) fn from_row(row: &Row) -> Result<Self, GatewayError> {
        Ok(Self {
            requirement_id: row.int("RequirementId"),
            job_code: row.require_text("requirement", "JobCode")?,
            item_code: row.require_text("requirement", "ItemCode")?,
            required_qty: row.float("RequiredQty").unwrap_or(0.0),
            required_date: row.date("RequiredDate"),
            dim_a: row.float("DimA").unwrap_or(0.0),
            order_line: row.int("SOrderLineNum"),
        })
    }
}

/// Dependent items created by one request
#[derive(Debug, Default)]
pub struct CreatedItems {
    /// Codes that now exist in WAIT, including those created before a failure
    pub codes: Vec<String>,
    /// Why creation stopped before every requested kind was created
    pub failure: Option<GatewayError>,
}

/// What the remote job-creation call reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCreationResult {
    pub job_code: Option<String>,
    /// Errors the remote reported for the first result group
    pub errors: Option<String>,
    /// Human summary of the processing totals, used when nothing else explains the outcome
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOrderRequest {
    pub job_code: String,
    pub item_code: String,
    pub quantity: f64,
    pub dim_a: f64,
    pub required_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalesOrderRequest {
    pub po_number: i64,
    /// Finished-good item code
    pub item_code: String,
    pub quantity: f64,
    pub required_date: Option<NaiveDate>,
    /// Customer reference carried over from the site-A order
    pub customer_reference: String,
}

/// A quantity change pushed to an existing downstream line
#[derive(Debug, Clone, PartialEq)]
pub enum LineQuantityUpdate {
    PurchaseOrder {
        po_number: i64,
        line: i64,
        item_code: String,
        quantity: f64,
    },
    SalesOrder {
        sales_order: i64,
        line: i64,
        item_code: String,
        quantity: f64,
        required_date: Option<NaiveDate>,
    },
    ShippingRequest {
        shipping_request: String,
        sales_order: i64,
        item_code: String,
        quantity: f64,
    },
}

impl LineQuantityUpdate {
    pub fn entity(&self) -> &'static str {
        match self {
            LineQuantityUpdate::PurchaseOrder { .. } => "XLinkAPIPOrder",
            LineQuantityUpdate::SalesOrder { .. } => "XLinkAPISOrder",
            LineQuantityUpdate::ShippingRequest { .. } => "XLinkAPIShipReq",
        }
    }

    pub fn quantity(&self) -> f64 {
        match self {
            LineQuantityUpdate::PurchaseOrder { quantity, .. }
            | LineQuantityUpdate::SalesOrder { quantity, .. }
            | LineQuantityUpdate::ShippingRequest { quantity, .. } => *quantity,
        }
    }
}
