//! Request/response envelope spoken by the XLink adapter.
//!
//! Requests wrap a base64-encoded JSON payload under `efiRadiusRequest`;
//! responses come back under `efiRadiusResponse`, usually as JSON but
//! occasionally as XML with the same element names.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use super::errors::{ApiFailure, GatewayError};

/// Status the adapter reports when the response itself could not be read
pub const UNREADABLE_STATUS: i64 = 9;

#[derive(Debug, Serialize)]
struct RequestEnvelope<'a> {
    #[serde(rename = "efiRadiusRequest")]
    request: RequestBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    entity_name: &'a str,
    payload: String,
}

/// Base64 of the compact JSON encoding of `payload`
pub fn encode_payload(payload: &Value) -> Result<String, GatewayError> {
    let raw = serde_json::to_vec(payload).map_err(|e| GatewayError::Decode {
        context: "request payload".to_string(),
        message: e.to_string(),
    })?;
    Ok(STANDARD.encode(raw))
}

/// Full request body for one entity call
pub fn encode_request(entity: &str, payload: &Value) -> Result<Value, GatewayError> {
    let envelope = RequestEnvelope {
        request: RequestBody {
            entity_name: entity,
            payload: encode_payload(payload)?,
        },
    };
    serde_json::to_value(envelope).map_err(|e| GatewayError::Decode {
        context: format!("{entity} request"),
        message: e.to_string(),
    })
}

/// Decoded inner payload of a response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Empty,
    Json(Value),
    /// The payload decoded but was not JSON
    Text(String),
}

/// One decoded adapter response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub entity: String,
    pub status_code: Option<i64>,
    pub error_message: String,
    pub payload: ResponsePayload,
    pub messages: Vec<String>,
    pub raw: String,
}

impl ApiResponse {
    /// Decode a raw response body. Never fails: anything unreadable is
    /// reported through `messages` with the unreadable status.
    pub fn decode(entity: &str, raw: &str) -> Self {
        let raw = raw.trim();
        match serde_json::from_str::<Value>(raw) {
            Ok(body) => Self::from_json(entity, raw, &body),
            Err(_) if raw.contains("<efiRadiusResponse>") => Self::from_xml(entity, raw),
            Err(_) => Self::unreadable(entity, raw, "response was neither JSON nor XML".to_string()),
        }
    }

    fn unreadable(entity: &str, raw: &str, message: String) -> Self {
        Self {
            entity: entity.to_string(),
            status_code: Some(UNREADABLE_STATUS),
            error_message: message.clone(),
            payload: ResponsePayload::Empty,
            messages: vec![message],
            raw: raw.to_string(),
        }
    }

    fn from_json(entity: &str, raw: &str, body: &Value) -> Self {
        let inner = body.get("efiRadiusResponse").unwrap_or(body);
        let status_code = inner.get("statusCode").and_then(value_as_i64);
        let entity_name = inner
            .get("entityName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(entity);
        let error_message = inner
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        let encoded = inner.get("payload").and_then(Value::as_str).unwrap_or_default();

        Self::assemble(entity_name, status_code, error_message, encoded, raw)
    }

    fn from_xml(entity: &str, raw: &str) -> Self {
        let mut fields = match xml_fields(raw) {
            Ok(fields) => fields,
            Err(e) => return Self::unreadable(entity, raw, format!("Failed to read XML response: {e}")),
        };
        let status_code = fields
            .get("statusCode")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .or(Some(UNREADABLE_STATUS));
        let entity_name = fields
            .remove("entityName")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| entity.to_string());
        let error_message = fields.remove("errorMessage").unwrap_or_default();
        let encoded = fields.remove("payload").unwrap_or_default();

        Self::assemble(entity_name.trim(), status_code, error_message.trim().to_string(), &encoded, raw)
    }

    fn assemble(
        entity: &str,
        status_code: Option<i64>,
        error_message: String,
        encoded: &str,
        raw: &str,
    ) -> Self {
        let mut messages = Vec::new();
        let payload = match decode_payload(encoded) {
            Ok(payload) => payload,
            Err(message) => {
                messages.push(message);
                ResponsePayload::Empty
            }
        };
        if !error_message.is_empty() && messages.is_empty() {
            messages.push(error_message.clone());
        }

        Self {
            entity: entity.to_string(),
            status_code,
            error_message,
            payload,
            messages,
            raw: raw.to_string(),
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Describe this response as a refusal
    pub fn failure(&self) -> ApiFailure {
        let message = self
            .messages
            .iter()
            .find(|m| !m.trim().is_empty())
            .cloned()
            .or_else(|| {
                (!self.error_message.is_empty()).then(|| self.error_message.clone())
            })
            .unwrap_or_else(|| format!("unexpected status {:?}", self.status_code));

        ApiFailure {
            entity: self.entity.clone(),
            status: self.status_code,
            message,
            messages: self.messages.clone(),
            raw: self.raw.clone(),
        }
    }

    /// Keep the response only if it reports `success`
    pub fn require_status(self, success: i64) -> Result<Self, GatewayError> {
        if self.status_code == Some(success) {
            Ok(self)
        } else {
            Err(GatewayError::Domain(self.failure()))
        }
    }

    /// Replace generic messages with entity-specific ones when present
    pub fn with_messages(mut self, messages: Vec<String>) -> Self {
        if !messages.is_empty() {
            self.messages = messages;
        }
        self
    }
}

fn decode_payload(encoded: &str) -> Result<ResponsePayload, String> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Ok(ResponsePayload::Empty);
    }
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| format!("Failed to decode payload: {e}"))?;
    let text = String::from_utf8_lossy(&bytes).trim().to_string();

    if text.starts_with('{') || text.starts_with('[') {
        serde_json::from_str(&text)
            .map(ResponsePayload::Json)
            .map_err(|e| format!("Failed to decode payload: {e}"))
    } else {
        Ok(ResponsePayload::Text(text))
    }
}

/// Unescaped text of every leaf element, first occurrence wins
fn xml_fields(raw: &str) -> Result<HashMap<String, String>, quick_xml::Error> {
    let mut reader = Reader::from_str(raw);
    let mut fields = HashMap::new();
    let mut open: Option<String> = None;
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                open = Some(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
                text.clear();
            }
            Event::Text(chunk) => text.push_str(&chunk.unescape()?),
            Event::CData(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
            Event::End(_) => {
                if let Some(name) = open.take() {
                    fields.entry(name).or_insert_with(|| text.clone());
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fields)
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn trimmed(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

/// Header and line errors from a sales-order response
pub fn sales_order_messages(payload: &Value) -> Vec<String> {
    let mut messages = Vec::new();
    for order in as_list(payload.pointer("/XLSOrders/XLSOrder")) {
        let number = display(order.get("SOrderNum"));
        if let Some(header) = trimmed(order.get("ErrorMessage")) {
            messages.push(format!("SO {number}: {header}"));
        }
        for line in as_list(order.get("XLSOrderPrice")) {
            if let Some(line_message) = trimmed(line.get("ErrorMessage")) {
                let item = display(line.get("ItemCode"));
                messages.push(format!("SO {number} Item {item}: {line_message}"));
            }
        }
    }
    messages
}

/// Per-item errors from an item mutation response
pub fn item_messages(payload: &Value) -> Vec<String> {
    as_list(payload.pointer("/XLItems/XLItem"))
        .into_iter()
        .filter_map(|item| {
            trimmed(item.get("ErrorMessage"))
                .map(|message| format!("Item {}: {}", display(item.get("ItemCode")), message))
        })
        .collect()
}

/// Errors reported anywhere a shipping-request response puts them
pub fn shipping_request_errors(payload: &Value) -> Vec<String> {
    let mut sources = vec![payload];
    if let Some(first) = first_shipping_request(payload) {
        sources.push(first);
    }

    let mut errors = Vec::new();
    for source in sources {
        for key in ["Errors", "Error", "ErrorMessage", "Message"] {
            match source.get(key) {
                Some(Value::Array(items)) => {
                    errors.extend(items.iter().map(|v| display(Some(v))).filter(|s| !s.trim().is_empty()))
                }
                other => {
                    if let Some(text) = trimmed(other) {
                        errors.push(text);
                    }
                }
            }
        }
    }
    errors
}

fn first_shipping_request(payload: &Value) -> Option<&Value> {
    let nested = payload.pointer("/XLShipReqs/XLShipReq").or_else(|| payload.get("XLShipReq"));
    as_list(nested).into_iter().next()
}

/// Shipping-request number from a create response, if echoed back
pub fn shipping_request_number(payload: &Value) -> Option<String> {
    let first = first_shipping_request(payload);
    [payload.get("ShipReqNum"), first.and_then(|f| f.get("ShipReqNum"))]
        .into_iter()
        .flatten()
        .map(|v| display(Some(v)))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty() && s != "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(status: Value, payload: &Value, error: &str) -> String {
        json!({
            "efiRadiusResponse": {
                "statusCode": status,
                "entityName": "XLinkAPISOrder",
                "errorMessage": error,
                "payload": STANDARD.encode(payload.to_string()),
            }
        })
        .to_string()
    }

    #[test]
    fn request_envelope_carries_base64_payload() {
        let body = encode_request("XLinkAPIPOrder", &json!({"XLPOrders": {"XLPOrder": []}})).unwrap();
        let request = &body["efiRadiusRequest"];
        assert_eq!(request["entityName"], "XLinkAPIPOrder");

        let decoded = STANDARD.decode(request["payload"].as_str().unwrap()).unwrap();
        let payload: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(payload, json!({"XLPOrders": {"XLPOrder": []}}));
    }

    #[test]
    fn json_response_with_string_status() {
        let raw = wrap(json!("1"), &json!({"XLSOrders": {"XLSOrder": [{"SOrderNum": 7001}]}}), "");
        let response = ApiResponse::decode("XLinkAPISOrder", &raw);
        assert_eq!(response.status_code, Some(1));
        assert_eq!(
            response.json().unwrap().pointer("/XLSOrders/XLSOrder/0/SOrderNum"),
            Some(&json!(7001))
        );
        assert!(response.require_status(1).is_ok());
    }

    #[test]
    fn non_json_payload_is_kept_as_text() {
        let raw = json!({
            "efiRadiusResponse": {
                "statusCode": 1,
                "payload": STANDARD.encode("Processed OK"),
            }
        })
        .to_string();
        let response = ApiResponse::decode("XLinkAPIPOrder", &raw);
        assert_eq!(response.payload, ResponsePayload::Text("Processed OK".to_string()));
        assert_eq!(response.entity, "XLinkAPIPOrder");
    }

    #[test]
    fn xml_fallback_reads_same_fields() {
        let payload = STANDARD.encode(r#"{"ok":true}"#);
        let raw = format!(
            "<efiRadiusResponse><statusCode>1</statusCode><entityName>XLinkAPIPOrder</entityName>\
             <errorMessage></errorMessage><payload>{payload}</payload></efiRadiusResponse>"
        );
        let response = ApiResponse::decode("XLinkAPIPOrder", &raw);
        assert_eq!(response.status_code, Some(1));
        assert_eq!(response.json(), Some(&json!({"ok": true})));
    }

    #[test]
    fn xml_text_is_unescaped() {
        let raw = "<efiRadiusResponse><statusCode>9</statusCode>\
                   <errorMessage>A &amp; B &lt;closed&gt;</errorMessage></efiRadiusResponse>";
        let response = ApiResponse::decode("XLinkAPISOrder", raw);
        assert_eq!(response.status_code, Some(9));
        assert_eq!(response.entity, "XLinkAPISOrder");
        assert_eq!(response.error_message, "A & B <closed>");
        assert_eq!(response.messages, vec!["A & B <closed>".to_string()]);
    }

    #[test]
    fn malformed_xml_is_unreadable() {
        let raw = "<efiRadiusResponse><statusCode>1</statusCode></wrong>";
        let response = ApiResponse::decode("XLinkAPISOrder", raw);
        assert_eq!(response.status_code, Some(UNREADABLE_STATUS));
        assert!(response.messages[0].starts_with("Failed to read XML response"));
    }

    #[test]
    fn unreadable_body_is_reported_not_raised() {
        let response = ApiResponse::decode("XLinkAPIPOrder", "<html>gateway timeout</html>");
        assert_eq!(response.status_code, Some(UNREADABLE_STATUS));
        let error = response.require_status(1).unwrap_err();
        assert!(matches!(error, GatewayError::Domain(_)));
    }

    #[test]
    fn sales_order_errors_cover_header_and_lines() {
        let payload = json!({
            "XLSOrders": {"XLSOrder": [{
                "SOrderNum": 7001,
                "ErrorMessage": " Customer on stop ",
                "XLSOrderPrice": [
                    {"ItemCode": "1600-ABC", "ErrorMessage": "Price missing"},
                    {"ItemCode": "1600-DEF", "ErrorMessage": ""}
                ]
            }]}
        });
        assert_eq!(
            sales_order_messages(&payload),
            vec!["SO 7001: Customer on stop", "SO 7001 Item 1600-ABC: Price missing"]
        );
    }

    #[test]
    fn shipping_request_errors_from_nested_record() {
        let payload = json!({
            "XLShipReq": [{"ShipReqNum": "0", "Errors": ["Shipping request already exists"]}]
        });
        assert_eq!(shipping_request_errors(&payload), vec!["Shipping request already exists"]);
        assert_eq!(shipping_request_number(&payload), None);

        let created = json!({"XLShipReqs": {"XLShipReq": [{"ShipReqNum": 88123}]}});
        assert!(shipping_request_errors(&created).is_empty());
        assert_eq!(shipping_request_number(&created).as_deref(), Some("88123"));
    }

    #[test]
    fn failure_prefers_specific_messages() {
        let raw = wrap(json!(9), &json!({}), "Generic failure");
        let response = ApiResponse::decode("XLinkAPISOrder", &raw)
            .with_messages(vec!["SO 1: Customer on stop".to_string()]);
        let failure = response.failure();
        assert_eq!(failure.message, "SO 1: Customer on stop");
        assert_eq!(failure.status, Some(9));
    }
}
