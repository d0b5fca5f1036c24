use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::envelope::{encode_request, ApiResponse};
use super::errors::GatewayError;
use crate::config::ErpConfig;

/// Rate-limited client for the XLink adapter's single POST endpoint
#[derive(Debug, Clone)]
pub struct XLinkClient {
    http: reqwest::Client,
    endpoint: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl XLinkClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, requests_per_second: u32) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            rate_limiter,
        })
    }

    pub fn from_config(config: &ErpConfig, api_url: &str) -> Result<Self, GatewayError> {
        Self::new(api_url, config.request_timeout(), config.requests_per_second)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one entity call and decode the response envelope.
    ///
    /// Transport problems and non-2xx answers are errors; whatever status the
    /// adapter reports inside a readable envelope is left to the caller.
    pub async fn call(&self, entity: &str, payload: &Value) -> Result<ApiResponse, GatewayError> {
        let body = encode_request(entity, payload)?;
        debug!(entity, payload = %payload, "XLink request");

        self.rate_limiter.until_ready().await;

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(entity, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::from_reqwest(entity, e))?;

        if !status.is_success() {
            warn!(entity, http_status = status.as_u16(), "XLink call rejected at HTTP level");
            return Err(GatewayError::from_http_status(entity, status.as_u16(), &text));
        }

        let decoded = ApiResponse::decode(entity, &text);
        debug!(
            entity,
            status_code = ?decoded.status_code,
            payload = ?decoded.json(),
            "XLink response"
        );
        Ok(decoded)
    }
}

#[derive(Debug, Deserialize)]
struct PriceUpdateReport {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Kick off the batch price import. Any problem is logged and reported as
/// `false`; the run never fails because of it.
pub async fn trigger_price_update(url: &str, timeout: Duration) -> bool {
    let http = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(http) => http,
        Err(e) => {
            warn!(error = %e, "Price update client could not be built");
            return false;
        }
    };

    let response = match http.post(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            warn!(url, error = %e, "Price update call failed (ignored)");
            return false;
        }
    };

    match response.json::<PriceUpdateReport>().await {
        Ok(report) if report.success => {
            info!("Price update ran successfully");
            true
        }
        Ok(report) => {
            warn!(stderr = ?report.stderr, error = ?report.error, "Price update reported success=false");
            false
        }
        Err(e) => {
            warn!(error = %e, "Price update response unreadable (ignored)");
            false
        }
    }
}
