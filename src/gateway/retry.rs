// Bounded exponential backoff for remote reads and adapter calls.
// Only transport-level failures are retried; refusals surface immediately.

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::errors::GatewayError;
use crate::config::ErpConfig;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl From<&ErpConfig> for RetryConfig {
    fn from(config: &ErpConfig) -> Self {
        Self {
            max_attempts: config.max_transient_retries.max(1),
            base_delay: config.retry_base_delay(),
            ..Self::default()
        }
    }
}

impl RetryConfig {
    fn delays(&self) -> Vec<Duration> {
        let base_ms = (self.base_delay.as_millis() as u64).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2 + 1)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1) as usize)
            .map(|delay| if self.jitter { jitter(delay) } else { delay })
            .collect()
    }
}

/// Run `operation`, retrying transient failures with backoff
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0u32;
    RetryIf::spawn(
        config.delays(),
        || {
            attempt += 1;
            debug!(operation = operation_name, attempt, "Remote call attempt");
            operation()
        },
        |error: &GatewayError| {
            let retry = error.is_transient();
            if retry {
                warn!(operation = operation_name, error = %error, "Transient failure; retrying");
            }
            retry
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    fn transient() -> GatewayError {
        GatewayError::Transport {
            entity: "XLinkAPIPOrder".to_string(),
            status: Some(503),
            message: "unavailable".to_string(),
            transient: true,
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_transient(&fast(), "po_by_job", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(5001)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 5001);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = retry_transient(&fast(), "po_by_job", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refusals_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = retry_transient(&fast(), "create_po", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::missing("PO response", "PONum"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_schedule_is_bounded() {
        let config = RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2500),
            jitter: false,
        };
        let delays = config.delays();
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(2500)));
    }
}
