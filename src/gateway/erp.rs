use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::{trigger_price_update, XLinkClient};
use super::envelope::{item_messages, sales_order_messages, shipping_request_errors, shipping_request_number};
use super::errors::GatewayError;
use super::payloads::{self, PriceHeader, ShippingRequestDraft};
use super::query::{AnyQueryExecutor, QueryExecutor, SqlParam};
use super::retry::{retry_transient, RetryConfig};
use super::rows::Row;
use super::sql::{self, Query};
use super::types::{
    CreatedItems, JobCreationResult, LineQuantityUpdate, OrderHeader, OrderLine, PurchaseOrderRequest, Requirement,
    SalesOrderRequest, Site,
};
use super::RemoteOrderGateway;
use crate::config::WorkflowConfig;
use crate::gates::{derive_dependent, ItemKind};

const PRICE_DIRECTION: i64 = 1;
const PRICE_USER: &str = "Fusion";
const PRICE_EFFECTIVE_DAYS_BACK: u64 = 5;

/// Gateway backed by the XLink adapter and the remote databases
pub struct ErpGateway {
    client: XLinkClient,
    reader: Arc<dyn QueryExecutor>,
    writer: Arc<dyn QueryExecutor>,
    retry: RetryConfig,
    line_visibility_attempts: u32,
    line_visibility_delay: Duration,
    requirements_sql: String,
    price_update_url: Option<String>,
    price_update_timeout: Duration,
}

impl ErpGateway {
    pub fn new(
        client: XLinkClient,
        reader: Arc<dyn QueryExecutor>,
        writer: Arc<dyn QueryExecutor>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            client,
            reader,
            writer,
            retry: RetryConfig::from(&config.erp),
            line_visibility_attempts: config.workflow.line_visibility_attempts.max(1),
            line_visibility_delay: config.workflow.line_visibility_delay(),
            requirements_sql: config
                .erp
                .job_requirements_sql
                .clone()
                .unwrap_or_else(|| sql::JOB_REQUIREMENTS.to_string()),
            price_update_url: config.erp.price_update_url.clone(),
            price_update_timeout: Duration::from_secs(config.erp.price_update_timeout_secs),
        }
    }

    /// Open both remote pools and the write client from configuration
    pub async fn connect(config: &WorkflowConfig) -> Result<Self, GatewayError> {
        let read_url = config
            .erp
            .read_database_url
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration("erp.read_database_url is not set".to_string()))?;
        let write_url = config
            .erp
            .write_database_url
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration("erp.write_database_url is not set".to_string()))?;

        let reader = AnyQueryExecutor::connect(read_url, config.erp.max_connections).await?;
        let writer = AnyQueryExecutor::connect(write_url, config.erp.max_connections).await?;
        let client = XLinkClient::from_config(&config.erp, &config.api_url())?;

        info!(env = config.env.as_str(), endpoint = client.endpoint(), "Remote order gateway connected");
        Ok(Self::new(client, Arc::new(reader), Arc::new(writer), config))
    }

    async fn fetch(&self, query: Query, params: &[SqlParam]) -> Result<Vec<Row>, GatewayError> {
        let reader = &self.reader;
        retry_transient(&self.retry, query.name, move || reader.fetch(query.name, query.sql, params)).await
    }

    async fn fetch_first(&self, query: Query, params: &[SqlParam]) -> Result<Option<Row>, GatewayError> {
        Ok(self.fetch(query, params).await?.into_iter().next())
    }

    async fn execute(&self, query: Query, params: &[SqlParam]) -> Result<u64, GatewayError> {
        let affected = self.writer.execute(query.name, query.sql, params).await?;
        debug!(statement = query.name, affected, "Remote statement applied");
        Ok(affected)
    }

    async fn site_b_header(&self, sales_order: i64) -> Result<Option<Row>, GatewayError> {
        self.fetch_first(sql::SO_HEADER_SITE_B, &[sales_order.into()]).await
    }

    /// Site-B lines, retried while the read side has not caught up
    async fn visible_site_b_lines(&self, sales_order: i64) -> Result<Vec<OrderLine>, GatewayError> {
        for attempt in 1..=self.line_visibility_attempts {
            let lines = self.line_status(sales_order).await?;
            if !lines.is_empty() {
                return Ok(lines);
            }
            debug!(sales_order, attempt, "Site-B lines not visible yet");
            if attempt < self.line_visibility_attempts {
                tokio::time::sleep(self.line_visibility_delay).await;
            }
        }
        Err(GatewayError::LinesNotVisible { sales_order })
    }

    /// Create each kind in turn, pushing a code as soon as its item exists
    async fn create_items_into(
        &self,
        core: &str,
        kinds: &[ItemKind],
        order: i64,
        created: &mut Vec<String>,
    ) -> Result<(), GatewayError> {
        let template = self
            .client
            .call("GetItem", &payloads::item_template_filter(core))
            .await?
            .require_status(0)?;
        let template = template
            .json()
            .cloned()
            .ok_or_else(|| GatewayError::missing(format!("GetItem template for {core}"), "payload"))?;

        let today = today();
        for kind in kinds {
            let code = derive_dependent(core, *kind);
            let item = payloads::placeholder_item(&template, *kind, &code)?;

            let response = self.client.call("XLinkAPIItem", &item).await?;
            let messages = response.json().map(item_messages).unwrap_or_default();
            response.with_messages(messages).require_status(1)?;
            info!(order, item = %code, kind = kind.label(), "Created item in WAIT");
            created.push(code.clone());

            self.insert_price_header(&PriceHeader::for_item(*kind, &code), today).await?;
        }
        Ok(())
    }

    async fn insert_price_header(&self, header: &PriceHeader, today: NaiveDate) -> Result<(), GatewayError> {
        let plant = header.site.plant_code();
        let exists = self
            .writer
            .fetch(
                sql::PRICE_HEADER_EXISTS.name,
                sql::PRICE_HEADER_EXISTS.sql,
                &[
                    header.item_code.as_str().into(),
                    plant.into(),
                    header.price_type.into(),
                    PRICE_DIRECTION.into(),
                    header.item_code.as_str().into(),
                ],
            )
            .await?;
        if !exists.is_empty() {
            info!(item = %header.item_code, plant, price_type = header.price_type, "Price header already present");
            return Ok(());
        }

        let effective = today
            .checked_sub_days(Days::new(PRICE_EFFECTIVE_DAYS_BACK))
            .unwrap_or(today);
        let mut params: Vec<SqlParam> = vec![
            PRICE_DIRECTION.into(),
            header.item_code.as_str().into(),
            today.into(),
        ];
        let query = match header.expiry_days.and_then(|days| today.checked_add_days(Days::new(days))) {
            Some(expiry) => {
                params.push(expiry.into());
                sql::INSERT_PRICE_HEADER_WITH_EXPIRY
            }
            None => sql::INSERT_PRICE_HEADER,
        };
        params.extend([
            PRICE_USER.into(),
            SqlParam::Int(0),
            SqlParam::Int(0),
            header.item_code.as_str().into(),
            effective.into(),
            "FEET".into(),
            payloads::PRICE_UNIT.into(),
            "USD".into(),
            header.price_type.into(),
            plant.into(),
        ]);

        self.execute(query, &params).await?;
        info!(item = %header.item_code, plant, price_type = header.price_type, "Inserted price header");
        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn first_record<'a>(payload: Option<&'a Value>, collection: &str, record: &str) -> Option<&'a Value> {
    let payload = payload?;
    let list = payload
        .get(collection)
        .and_then(|c| c.get(record))
        .or_else(|| payload.get(record))
        .unwrap_or(payload);
    match list {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Interpret an advanced-order-processing response
pub fn parse_job_creation(order: i64, status: Option<i64>, payload: Option<&Value>) -> JobCreationResult {
    let output = payload.and_then(|p| p.get("Output"));
    let first = output
        .and_then(|o| o.get("Results"))
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(Value::as_object)
        .map(Row::from_object);

    let errors = first.as_ref().and_then(|r| r.text_any(&["Errors", "Error"]));
    let job_code = first.as_ref().and_then(|r| r.text_any(&["Job Code", "JobCode"]));

    let mut parts = vec![format!("Job Code missing and AOP returned no Errors. SO={order}")];
    if let Some(status) = status {
        parts.push(format!("efiStatusCode={status}"));
    }
    if let Some(aop) = payload.and_then(|p| p.pointer("/AdvancedOrderProcessing/Status")) {
        parts.push(format!("AOPStatus={}", display(aop)));
    }
    let totals = [
        ("/Requirements/Total", "RequirementsTotal"),
        ("/Groups/Total", "GroupsTotal"),
        ("/Groups/Successful", "GroupsSuccessful"),
        ("/Groups/Failed", "GroupsFailed"),
    ];
    for (pointer, label) in totals {
        if let Some(value) = output.and_then(|o| o.pointer(pointer)).filter(|v| !v.is_null()) {
            parts.push(format!("{label}={}", display(value)));
        }
    }
    if let Some(first) = &first {
        for key in ["Group", "Failed", "Total"] {
            if let Some(value) = first.text(key) {
                parts.push(format!("{key}={value}"));
            }
        }
        let requirement = first
            .value("Requirements")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(Value::as_object)
            .map(Row::from_object);
        if let Some(requirement) = requirement {
            if let Some(source) = requirement.text("Source") {
                parts.push(format!("Requirement={source}"));
            }
            if let Some(item) = requirement.text_any(&["Item Code", "ItemCode"]) {
                parts.push(format!("Item={item}"));
            }
            if let Some(quantity) = requirement.text("Quantity") {
                parts.push(format!("Qty={quantity}"));
            }
        }
    }

    JobCreationResult {
        job_code,
        errors,
        summary: parts.join(", "),
    }
}

#[async_trait]
impl RemoteOrderGateway for ErpGateway {
    async fn find_eligible_orders(&self, start_date: NaiveDate, limit: usize) -> Result<Vec<i64>, GatewayError> {
        let rows = self.fetch(sql::ELIGIBLE_ORDERS, &[start_date.into()]).await?;
        let mut orders: Vec<i64> = rows.iter().filter_map(|row| row.int("SOrderNum")).collect();
        orders.dedup();
        orders.truncate(limit);
        Ok(orders)
    }

    async fn is_eligible_order(&self, order: i64) -> Result<bool, GatewayError> {
        Ok(self.fetch_first(sql::ELIGIBLE_ORDER, &[order.into()]).await?.is_some())
    }

    async fn order_lines(&self, order: i64) -> Result<Vec<OrderLine>, GatewayError> {
        let rows = self.fetch(sql::ORDER_LINES_SITE_A, &[order.into()]).await?;
        rows.iter().map(OrderLine::from_row).collect()
    }

    async fn order_header(&self, order: i64) -> Result<OrderHeader, GatewayError> {
        let row = self.fetch_first(sql::ORDER_HEADER_SITE_A, &[order.into()]).await?;
        Ok(OrderHeader {
            order_id: order,
            customer_reference: row.and_then(|r| r.text("CustRef")),
        })
    }

    async fn item_status(&self, item_code: &str) -> Result<Option<String>, GatewayError> {
        let row = self.fetch_first(sql::ITEM_STATUS, &[item_code.into()]).await?;
        Ok(row.map(|r| {
            r.text("ItemStatusCode")
                .map(|s| s.to_ascii_uppercase())
                .unwrap_or_default()
        }))
    }

    async fn find_existing_job(&self, site: Site, order: i64) -> Result<Option<String>, GatewayError> {
        let query = match site {
            Site::SiteA => sql::JOB_BY_ORDER_SITE_A,
            Site::SiteB => sql::JOB_BY_ORDER_SITE_B,
        };
        let job = self
            .fetch_first(query, &[order.into()])
            .await?
            .and_then(|r| r.text("JobCode"));
        if let Some(job) = &job {
            info!(%site, order, job = %job, "Existing job found");
        }
        Ok(job)
    }

    async fn requirements(&self, job: &str) -> Result<Vec<Requirement>, GatewayError> {
        let params = [SqlParam::from(job)];
        let (reader, statement, params) = (&self.reader, self.requirements_sql.as_str(), &params[..]);
        let rows = retry_transient(&self.retry, "job_requirements", move || {
            reader.fetch("job_requirements", statement, params)
        })
        .await?;
        rows.iter().map(Requirement::from_row).collect()
    }

    async fn current_requirements(&self, job: &str) -> Result<Vec<Requirement>, GatewayError> {
        let rows = self.fetch(sql::CURRENT_REQUIREMENTS, &[job.into()]).await?;
        rows.iter().map(Requirement::from_row).collect()
    }

    async fn find_purchase_order_by_job(&self, job: &str) -> Result<Option<i64>, GatewayError> {
        Ok(self
            .fetch_first(sql::PO_BY_JOB, &[job.into()])
            .await?
            .and_then(|r| r.int("POrderNum")))
    }

    async fn find_sales_order_by_po(&self, po_number: i64) -> Result<Option<i64>, GatewayError> {
        Ok(self
            .fetch_first(sql::SO_BY_PO, &[po_number.to_string().into()])
            .await?
            .and_then(|r| r.int("SOrderNum")))
    }

    async fn poll_status(&self, sales_order: i64) -> Result<Option<i64>, GatewayError> {
        Ok(self
            .fetch_first(sql::SO_STATUS_SITE_B, &[sales_order.into()])
            .await?
            .and_then(|r| r.int("SOrderStat")))
    }

    async fn find_shipping_request(&self, sales_order: i64) -> Result<Option<String>, GatewayError> {
        Ok(self
            .fetch_first(sql::SHIPPING_REQUEST_BY_SO, &[sales_order.into()])
            .await?
            .and_then(|r| r.text("ShipReqNum")))
    }

    async fn line_status(&self, sales_order: i64) -> Result<Vec<OrderLine>, GatewayError> {
        let rows = self.fetch(sql::SO_LINES_SITE_B, &[sales_order.into()]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| OrderLine::from_row(row).ok())
            .collect())
    }

    async fn job_line_quantity(&self, job: &str) -> Result<Option<f64>, GatewayError> {
        Ok(self
            .fetch_first(sql::JOB_LINE_QUANTITY_SITE_B, &[job.into()])
            .await?
            .and_then(|r| r.float("OrderedQty")))
    }

    async fn create_placeholder_items(&self, core: &str, kinds: &[ItemKind], order: i64) -> CreatedItems {
        let mut created = CreatedItems::default();
        if kinds.is_empty() {
            return created;
        }
        if let Err(e) = self.create_items_into(core, kinds, order, &mut created.codes).await {
            warn!(order, core, created = created.codes.len(), error = %e, "Item creation stopped part-way");
            created.failure = Some(e);
        }
        created
    }

    async fn create_job_at_site(&self, site: Site, order: i64) -> Result<JobCreationResult, GatewayError> {
        info!(%site, order, "Creating job");
        let response = self
            .client
            .call("AdvancedOrderProcessing", &payloads::job_creation(site, order))
            .await?;
        let result = parse_job_creation(order, response.status_code, response.json());
        if let Some(job) = &result.job_code {
            info!(%site, order, job = %job, "Job created");
        }
        Ok(result)
    }

    async fn create_purchase_order(&self, request: &PurchaseOrderRequest) -> Result<i64, GatewayError> {
        let payload = payloads::purchase_order(request, today());
        let response = self
            .client
            .call("XLinkAPIPOrder", &payload)
            .await?
            .require_status(1)?;

        let record = first_record(response.json(), "XLPOrders", "XLPOrder")
            .and_then(Value::as_object)
            .map(Row::from_object)
            .ok_or_else(|| GatewayError::missing("purchase order response", "XLPOrders.XLPOrder"))?;
        let po_number = record.require_int("purchase order response", "POrderNum")?;
        info!(job = %request.job_code, po_number, "Purchase order created");
        Ok(po_number)
    }

    async fn create_sales_order(&self, request: &SalesOrderRequest) -> Result<i64, GatewayError> {
        let payload = payloads::sales_order(request, today());
        let response = self.client.call("XLinkAPISOrder", &payload).await?;
        let messages = response.json().map(sales_order_messages).unwrap_or_default();
        let response = response.with_messages(messages).require_status(1)?;

        let record = first_record(response.json(), "XLSOrders", "XLSOrder")
            .and_then(Value::as_object)
            .map(Row::from_object)
            .ok_or_else(|| GatewayError::missing("sales order response", "XLSOrders.XLSOrder"))?;
        let sales_order = record.require_int("sales order response", "SOrderNum")?;
        info!(po_number = request.po_number, sales_order, "Site-B sales order created");
        Ok(sales_order)
    }

    async fn create_shipping_request(&self, sales_order: i64) -> Result<Option<String>, GatewayError> {
        let header = self.site_b_header(sales_order).await?;
        let lines = self.visible_site_b_lines(sales_order).await?;
        let line = lines
            .into_iter()
            .next()
            .ok_or(GatewayError::LinesNotVisible { sales_order })?;

        let ship_date = line
            .required_date
            .or_else(|| header.as_ref().and_then(|h| h.date("ReqDate")))
            .ok_or_else(|| GatewayError::missing(format!("site-B order {sales_order}"), "ReqDate"))?;
        let reference = header
            .as_ref()
            .and_then(|h| h.text_any(&["CustRef", "AddtCustRef"]))
            .unwrap_or_else(|| format!("SO:{sales_order}"));

        let draft = ShippingRequestDraft {
            sales_order,
            line_number: line.line_number,
            item_code: line.item_code,
            quantity: line.ordered_qty,
            ship_date,
            reference,
        };
        info!(sales_order, item = %draft.item_code, qty = draft.quantity, ship_date = %draft.ship_date, "Creating shipping request");

        let response = self
            .client
            .call("XLinkAPIShipReq", &payloads::shipping_request(&draft))
            .await?;
        let payload = response.json().cloned().unwrap_or(Value::Null);
        let errors = shipping_request_errors(&payload);

        if !errors.is_empty() {
            let combined = errors.join(" | ");
            let lowered = combined.to_lowercase();
            if lowered.contains("already exists") || lowered.contains("duplicate") {
                let existing = self.find_shipping_request(sales_order).await?;
                if existing.is_none() {
                    warn!(sales_order, "Duplicate shipping request reported but none found");
                }
                return Ok(existing);
            }
            let mut failure = response.failure();
            failure.message = combined;
            failure.messages = errors;
            return Err(GatewayError::Domain(failure));
        }

        if let Some(status) = response.status_code.filter(|s| *s == 9) {
            let mut failure = response.failure();
            failure.status = Some(status);
            return Err(GatewayError::Domain(failure));
        }

        Ok(shipping_request_number(&payload))
    }

    async fn force_authorize(&self, sales_order: i64) -> Result<(), GatewayError> {
        let affected = self.execute(sql::FORCE_AUTHORIZE, &[sales_order.into()]).await?;
        info!(sales_order, affected, "Forced site-B order to authorized");
        Ok(())
    }

    async fn confirm_purchase_order(&self, po_number: i64) -> Result<(), GatewayError> {
        let affected = self.execute(sql::CONFIRM_PURCHASE_ORDER, &[po_number.into()]).await?;
        info!(po_number, affected, "Purchase order confirmed");
        Ok(())
    }

    async fn update_line_quantity(&self, update: &LineQuantityUpdate) -> Result<(), GatewayError> {
        let entity = update.entity();
        let response = self.client.call(entity, &payloads::line_quantity(update)).await?;
        let messages = match update {
            LineQuantityUpdate::SalesOrder { .. } => response.json().map(sales_order_messages).unwrap_or_default(),
            LineQuantityUpdate::ShippingRequest { .. } => {
                response.json().map(shipping_request_errors).unwrap_or_default()
            }
            LineQuantityUpdate::PurchaseOrder { .. } => Vec::new(),
        };
        response.with_messages(messages).require_status(1)?;
        info!(entity, qty = update.quantity(), "Line quantity updated");
        Ok(())
    }

    async fn update_order_reference(&self, sales_order: i64, reference: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .call("XLinkAPISOrder", &payloads::order_reference(sales_order, reference))
            .await?;
        let messages = response.json().map(sales_order_messages).unwrap_or_default();
        response.with_messages(messages).require_status(1)?;
        info!(sales_order, reference, "Site-B order reference updated");
        Ok(())
    }

    async fn trigger_price_update(&self) -> bool {
        match &self.price_update_url {
            Some(url) => trigger_price_update(url, self.price_update_timeout).await,
            None => {
                debug!("No price update endpoint configured");
                false
            }
        }
    }

    async fn apply_price_codes(&self, items: &[String]) -> Result<(), GatewayError> {
        for item in items {
            let query = match ItemKind::of(item) {
                Some(ItemKind::Substrate) => sql::SET_PURCHASE_PRICE_CODE,
                Some(ItemKind::FinishedGood) => sql::SET_SALES_PRICE_CODE,
                None => continue,
            };
            self.execute(query, &[item.as_str().into()]).await?;
            info!(item = %item, statement = query.name, "Price code applied");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::query::MockQueryExecutor;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use mockall::predicate::eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_at(endpoint: &str, reader: MockQueryExecutor, writer: MockQueryExecutor) -> ErpGateway {
        let mut config = WorkflowConfig::default();
        config.workflow.line_visibility_attempts = 2;
        config.workflow.line_visibility_delay_ms = 1;
        config.erp.retry_base_delay_ms = 1;
        let client = XLinkClient::new(endpoint, Duration::from_secs(1), 50).unwrap();
        ErpGateway::new(client, Arc::new(reader), Arc::new(writer), &config)
    }

    fn gateway(reader: MockQueryExecutor, writer: MockQueryExecutor) -> ErpGateway {
        gateway_at("http://127.0.0.1:9/api", reader, writer)
    }

    fn envelope(status_code: i64, payload: &Value) -> Value {
        json!({
            "efiRadiusResponse": {
                "entityName": "",
                "statusCode": status_code,
                "errorMessage": "",
                "payload": STANDARD.encode(payload.to_string()),
            }
        })
    }

    fn entity(name: &str) -> wiremock::matchers::BodyPartialJsonMatcher {
        body_partial_json(json!({"efiRadiusRequest": {"entityName": name}}))
    }

    #[tokio::test]
    async fn test_items_created_before_a_refusal_are_reported() {
        let server = MockServer::start().await;
        let template = json!({"XLItems": {"XLItem": [{"ItemCode": "2300-ABC", "ItemStatusCode": "APP"}]}});
        Mock::given(method("POST"))
            .and(entity("GetItem"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(0, &template)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(entity("XLinkAPIItem"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(1, &json!({}))))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        let refused = json!({"XLItems": {"XLItem": [{"ItemCode": "1600-2300-ABC", "ErrorMessage": "Template invalid"}]}});
        Mock::given(method("POST"))
            .and(entity("XLinkAPIItem"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(9, &refused)))
            .mount(&server)
            .await;

        // Only the item that exists gets a price header
        let mut writer = MockQueryExecutor::new();
        writer
            .expect_fetch()
            .withf(|name, _, params| name == "price_header_exists" && params[0] == SqlParam::from("16P4-2300-ABC"))
            .times(1)
            .returning(|_, _, _| Ok(vec![Row::from_pairs([("Present", json!(1))])]));
        let erp = gateway_at(&format!("{}/api", server.uri()), MockQueryExecutor::new(), writer);

        let created = erp
            .create_placeholder_items("2300-ABC", &[ItemKind::Substrate, ItemKind::FinishedGood], 1001)
            .await;
        assert_eq!(created.codes, vec!["16P4-2300-ABC".to_string()]);
        let failure = created.failure.unwrap();
        assert!(failure.to_string().contains("Template invalid"));
    }

    #[tokio::test]
    async fn test_connect_requires_database_urls() {
        let config = WorkflowConfig::default();
        let error = ErpGateway::connect(&config).await.err().unwrap();
        assert!(matches!(error, GatewayError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_item_status_missing_vs_present() {
        let mut reader = MockQueryExecutor::new();
        reader
            .expect_fetch()
            .withf(|name, _, params| name == "item_status" && params == [SqlParam::from("16P4-ABC")])
            .returning(|_, _, _| Ok(vec![Row::from_pairs([("ItemStatusCode", json!("app"))])]));
        reader
            .expect_fetch()
            .withf(|name, _, params| name == "item_status" && params == [SqlParam::from("1600-ABC")])
            .returning(|_, _, _| Ok(vec![]));
        let erp = gateway(reader, MockQueryExecutor::new());

        assert_eq!(erp.item_status("16P4-ABC").await.unwrap().as_deref(), Some("APP"));
        assert_eq!(erp.item_status("1600-ABC").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transient_read_is_retried() {
        let mut reader = MockQueryExecutor::new();
        let mut seq = mockall::Sequence::new();
        reader
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, _, _| {
                Err(GatewayError::Query {
                    name: name.to_string(),
                    message: "connection reset".to_string(),
                    transient: true,
                })
            });
        reader
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(vec![Row::from_pairs([("POrderNum", json!(5001))])]));
        let erp = gateway(reader, MockQueryExecutor::new());

        assert_eq!(erp.find_purchase_order_by_job("P4J-1001").await.unwrap(), Some(5001));
    }

    #[tokio::test]
    async fn test_shipping_request_waits_for_lines() {
        let mut reader = MockQueryExecutor::new();
        reader
            .expect_fetch()
            .withf(|name, _, _| name == "so_header_site_b")
            .returning(|_, _, _| Ok(vec![]));
        reader
            .expect_fetch()
            .withf(|name, _, _| name == "so_lines_site_b")
            .times(2)
            .returning(|_, _, _| Ok(vec![]));
        let erp = gateway(reader, MockQueryExecutor::new());

        let error = erp.create_shipping_request(7001).await.unwrap_err();
        assert!(matches!(error, GatewayError::LinesNotVisible { sales_order: 7001 }));
    }

    #[tokio::test]
    async fn test_price_codes_follow_item_kind() {
        let mut writer = MockQueryExecutor::new();
        writer
            .expect_execute()
            .with(eq("set_purchase_price_code"), mockall::predicate::always(), eq(vec![SqlParam::from("16P4-ABC")]))
            .times(1)
            .returning(|_, _, _| Ok(1));
        writer
            .expect_execute()
            .with(eq("set_sales_price_code"), mockall::predicate::always(), eq(vec![SqlParam::from("1600-ABC")]))
            .times(1)
            .returning(|_, _, _| Ok(1));
        let erp = gateway(MockQueryExecutor::new(), writer);

        let items = vec!["16P4-ABC".to_string(), "1600-ABC".to_string(), "OTHER".to_string()];
        erp.apply_price_codes(&items).await.unwrap();
    }

    #[tokio::test]
    async fn test_price_update_without_endpoint_is_skipped() {
        let erp = gateway(MockQueryExecutor::new(), MockQueryExecutor::new());
        assert!(!erp.trigger_price_update().await);
    }

    #[test]
    fn job_code_read_from_first_result() {
        let payload = json!({"Output": {"Results": [{"Job Code": " P4J-1001 ", "Errors": ""}]}});
        let result = parse_job_creation(1001, Some(1), Some(&payload));
        assert_eq!(result.job_code.as_deref(), Some("P4J-1001"));
        assert!(result.errors.is_none());
    }

    #[test]
    fn explicit_errors_are_surfaced() {
        let payload = json!({"Output": {"Results": [{"Error": "Sales order 1001 is on hold"}]}});
        let result = parse_job_creation(1001, Some(1), Some(&payload));
        assert_eq!(result.errors.as_deref(), Some("Sales order 1001 is on hold"));
        assert!(result.job_code.is_none());
    }

    #[test]
    fn summary_built_from_totals_when_no_results() {
        let payload = json!({
            "AdvancedOrderProcessing": {"Status": "Completed"},
            "Output": {
                "Requirements": {"Total": 0},
                "Groups": {"Total": 1, "Successful": 0, "Failed": 1},
                "Results": [],
            }
        });
        let result = parse_job_creation(7001, Some(1), Some(&payload));
        assert!(result.job_code.is_none());
        assert_eq!(
            result.summary,
            "Job Code missing and AOP returned no Errors. SO=7001, efiStatusCode=1, AOPStatus=Completed, \
             RequirementsTotal=0, GroupsTotal=1, GroupsSuccessful=0, GroupsFailed=1"
        );
    }

    #[test]
    fn summary_includes_first_requirement() {
        let payload = json!({
            "Output": {"Results": [{
                "Group": 1, "Failed": 1, "Total": 1,
                "Requirements": [{"Source": "SO 7001/1", "Item Code": "1600-ABC", "Quantity": 1250}]
            }]}
        });
        let result = parse_job_creation(7001, None, Some(&payload));
        assert!(result.summary.ends_with("Group=1, Failed=1, Total=1, Requirement=SO 7001/1, Item=1600-ABC, Qty=1250"));
    }

    #[test]
    fn first_record_accepts_wrapped_and_bare_shapes() {
        let wrapped = json!({"XLPOrders": {"XLPOrder": [{"POrderNum": 5001}]}});
        let bare = json!({"XLPOrder": {"POrderNum": 5002}});
        assert_eq!(first_record(Some(&wrapped), "XLPOrders", "XLPOrder").unwrap()["POrderNum"], 5001);
        assert_eq!(first_record(Some(&bare), "XLPOrders", "XLPOrder").unwrap()["POrderNum"], 5002);
        assert!(first_record(None, "XLPOrders", "XLPOrder").is_none());
    }
}
