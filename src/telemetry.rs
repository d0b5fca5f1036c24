use crate::config::{DeployEnv, ObservabilityConfig};
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level when present.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()?;
    }

    tracing::info!("LWS fulfillment telemetry initialized with structured logging");
    Ok(())
}

/// Generate an identifier for one workflow run
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping a whole workflow run
pub fn run_span(run_id: &str, env: DeployEnv) -> tracing::Span {
    tracing::info_span!(
        "workflow_run",
        run.id = run_id,
        run.env = env.as_str(),
    )
}

/// Span wrapping one order's pass through the pipeline
pub fn order_span(run_id: &str, order_id: i64) -> tracing::Span {
    tracing::info_span!("order", run.id = run_id, order.id = order_id)
}

/// Span wrapping a reconciliation phase
pub fn reconcile_span(run_id: &str, phase: &'static str) -> tracing::Span {
    tracing::info_span!("reconcile", run.id = run_id, reconcile.phase = phase)
}
