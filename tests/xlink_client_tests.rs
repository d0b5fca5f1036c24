//! XLink adapter client tests
//!
//! These tests use wiremock to stand in for the adapter's single POST
//! endpoint and the price update service, so envelope handling and error
//! classification are exercised over real HTTP.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lws_fulfillment::gateway::client::trigger_price_update;
use lws_fulfillment::gateway::envelope::encode_payload;
use lws_fulfillment::gateway::{GatewayError, XLinkClient};

/// Adapter mock server for deterministic testing
struct XLinkMock {
    server: MockServer,
}

impl XLinkMock {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn client(&self) -> XLinkClient {
        XLinkClient::new(
            format!("{}/radadapter/radius/api", self.server.uri()),
            Duration::from_secs(5),
            50,
        )
        .unwrap()
    }

    /// Answer every call with a JSON envelope carrying `payload`
    async fn respond_json(&self, status_code: i64, error_message: &str, payload: &Value) {
        let body = json!({
            "efiRadiusResponse": {
                "entityName": "",
                "statusCode": status_code,
                "errorMessage": error_message,
                "payload": STANDARD.encode(payload.to_string()),
            }
        });
        Mock::given(method("POST"))
            .and(path("/radadapter/radius/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn respond_raw(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path("/radadapter/radius/api"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }
}

#[tokio::test]
async fn test_request_is_wrapped_in_encoded_envelope() {
    let mock = XLinkMock::new().await;
    let payload = json!({"Job": {"JobCode": "P4J-1001"}});
    let expected = json!({
        "efiRadiusRequest": {
            "entityName": "Job",
            "payload": encode_payload(&payload).unwrap(),
        }
    });

    Mock::given(method("POST"))
        .and(path("/radadapter/radius/api"))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "efiRadiusResponse": {"entityName": "Job", "statusCode": 0, "errorMessage": "", "payload": ""}
        })))
        .expect(1)
        .mount(&mock.server)
        .await;

    let response = mock.client().call("Job", &payload).await.unwrap();
    assert_eq!(response.status_code, Some(0));
    assert_eq!(response.entity, "Job");
}

#[tokio::test]
async fn test_json_payload_is_decoded() {
    let mock = XLinkMock::new().await;
    mock.respond_json(0, "", &json!({"Job": {"JobCode": "P2J-7001"}}))
        .await;

    let response = mock.client().call("Job", &json!({})).await.unwrap();
    // an empty entity name in the answer falls back to the requested entity
    assert_eq!(response.entity, "Job");
    assert_eq!(
        response.json().and_then(|v| v.pointer("/Job/JobCode")),
        Some(&json!("P2J-7001"))
    );
    assert!(response.messages.is_empty());
}

#[tokio::test]
async fn test_refusal_surfaces_error_message() {
    let mock = XLinkMock::new().await;
    mock.respond_json(1, "Customer account is On Hold", &json!({}))
        .await;

    let response = mock.client().call("Job", &json!({})).await.unwrap();
    let err = response.require_status(0).unwrap_err();
    match err {
        GatewayError::Domain(failure) => {
            assert_eq!(failure.status, Some(1));
            assert_eq!(failure.message, "Customer account is On Hold");
        }
        other => panic!("expected a domain refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn test_xml_response_is_understood() {
    let mock = XLinkMock::new().await;
    let payload = STANDARD.encode(r#"{"SalesOrder":{"OrderNum":7001}}"#);
    mock.respond_raw(
        200,
        &format!(
            "<efiRadiusResponse><entityName>SalesOrder</entityName><statusCode>0</statusCode>\
             <errorMessage></errorMessage><payload>{payload}</payload></efiRadiusResponse>"
        ),
    )
    .await;

    let response = mock.client().call("SalesOrder", &json!({})).await.unwrap();
    assert_eq!(response.status_code, Some(0));
    assert_eq!(
        response.json().and_then(|v| v.pointer("/SalesOrder/OrderNum")),
        Some(&json!(7001))
    );
}

#[tokio::test]
async fn test_unreadable_body_reports_unreadable_status() {
    let mock = XLinkMock::new().await;
    mock.respond_raw(200, "gateway says hello").await;

    let response = mock.client().call("Item", &json!({})).await.unwrap();
    assert_eq!(response.status_code, Some(9));
    assert!(!response.messages.is_empty());
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let mock = XLinkMock::new().await;
    mock.respond_raw(503, "busy").await;

    let err = mock.client().call("Job", &json!({})).await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("HTTP 503"));
}

#[tokio::test]
async fn test_client_errors_are_not_transient() {
    let mock = XLinkMock::new().await;
    mock.respond_raw(400, "bad request").await;

    let err = mock.client().call("Job", &json!({})).await.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.api_failure().is_none());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let client = XLinkClient::new("http://127.0.0.1:9/api", Duration::from_secs(1), 10).unwrap();
    let err = client.call("Job", &json!({})).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_price_update_reports_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/price-update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let url = format!("{}/price-update", server.uri());
    assert!(trigger_price_update(&url, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_price_update_failures_are_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refused"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": false, "stderr": "locked"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let timeout = Duration::from_secs(5);
    assert!(!trigger_price_update(&format!("{}/refused", server.uri()), timeout).await);
    assert!(!trigger_price_update(&format!("{}/broken", server.uri()), timeout).await);
}
