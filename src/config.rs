use anyhow::Result;
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deployment environment; selects the default remote endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeployEnv {
    #[default]
    #[serde(alias = "test")]
    Test,
    #[serde(alias = "live")]
    Live,
}

impl DeployEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Test => "TEST",
            DeployEnv::Live => "LIVE",
        }
    }

    fn default_api_url(&self) -> &'static str {
        match self {
            DeployEnv::Test => "http://FSMRATEST2:8081/radadapter/radius/api",
            DeployEnv::Live => "http://fsmradius:8081/radadapter/radius/api",
        }
    }
}

/// Main configuration structure for the fulfillment workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// TEST or LIVE
    pub env: DeployEnv,
    /// Remote order system endpoints and transport tuning
    pub erp: ErpConfig,
    /// Pipeline behaviour
    pub workflow: PipelineConfig,
    /// Local state store
    pub store: StoreConfig,
    /// Notification recipients and hold-aging thresholds
    pub notifications: NotificationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ErpConfig {
    /// XLink adapter endpoint (defaults per environment)
    pub api_url: Option<String>,
    /// Read-only connection used for lookups
    pub read_database_url: Option<String>,
    /// Read/write connection used for status corrections and price headers
    pub write_database_url: Option<String>,
    pub max_connections: u32,
    pub request_timeout_secs: u64,
    pub max_transient_retries: u32,
    pub retry_base_delay_ms: u64,
    pub requests_per_second: u32,
    /// Batch price-update trigger run after each workflow run
    pub price_update_url: Option<String>,
    pub price_update_timeout_secs: u64,
    /// Replaces the built-in job requirement query
    pub job_requirements_sql: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_orders_per_run: usize,
    /// Orders dated before this are never picked up
    pub eligibility_start_date: NaiveDate,
    pub status_poll_attempts: u32,
    pub status_poll_delay_ms: u64,
    pub line_visibility_attempts: u32,
    pub line_visibility_delay_ms: u64,
    /// Attempts for a create call that fails with a transient transport error
    pub create_attempts: u32,
    pub archive_after_days: i64,
    pub reconciliation_batch_limit: i64,
    /// Exclusive lock file guarding against concurrent runs
    pub lock_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite URL or file path
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub admin: Vec<String>,
    pub csr: Vec<String>,
    pub fulfillment: Vec<String>,
    pub hold_reminder_after_hours: i64,
    pub hold_reminder_interval_hours: i64,
    pub hold_escalate_after_hours: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            read_database_url: None,
            write_database_url: None,
            max_connections: 4,
            request_timeout_secs: 60,
            max_transient_retries: 3,
            retry_base_delay_ms: 1000,
            requests_per_second: 5,
            price_update_url: None,
            price_update_timeout_secs: 900,
            job_requirements_sql: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_orders_per_run: 200,
            eligibility_start_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap_or_default(),
            status_poll_attempts: 10,
            status_poll_delay_ms: 1000,
            line_visibility_attempts: 6,
            line_visibility_delay_ms: 1000,
            create_attempts: 2,
            archive_after_days: 30,
            reconciliation_batch_limit: 500,
            lock_path: PathBuf::from("state/lws-fulfillment.lock"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://state/lws-fulfillment.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin: Vec::new(),
            csr: Vec::new(),
            fulfillment: Vec::new(),
            hold_reminder_after_hours: 48,
            hold_reminder_interval_hours: 24,
            hold_escalate_after_hours: 120,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl ErpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl PipelineConfig {
    pub fn status_poll_delay(&self) -> Duration {
        Duration::from_millis(self.status_poll_delay_ms)
    }

    pub fn line_visibility_delay(&self) -> Duration {
        Duration::from_millis(self.line_visibility_delay_ms)
    }
}

impl WorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (lws-fulfillment.toml)
    /// 3. Environment variables (prefixed with LWS_, sections split by `__`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("lws-fulfillment.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("LWS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("notifications.admin")
                .with_list_parse_key("notifications.csr")
                .with_list_parse_key("notifications.fulfillment"),
        );

        let config = builder.build()?;
        let workflow_config: WorkflowConfig = config.try_deserialize()?;
        Ok(workflow_config)
    }

    /// XLink endpoint, falling back to the environment default
    pub fn api_url(&self) -> String {
        self.erp
            .api_url
            .clone()
            .unwrap_or_else(|| self.env.default_api_url().to_string())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_production_limits() {
        let config = WorkflowConfig::default();
        assert_eq!(config.env, DeployEnv::Test);
        assert_eq!(config.workflow.max_orders_per_run, 200);
        assert_eq!(config.workflow.status_poll_attempts, 10);
        assert_eq!(config.notifications.hold_escalate_after_hours, 120);
        assert!(config.api_url().contains("FSMRATEST2"));
    }

    #[test]
    fn live_environment_switches_default_endpoint() {
        let config = WorkflowConfig {
            env: DeployEnv::Live,
            ..WorkflowConfig::default()
        };
        assert!(config.api_url().starts_with("http://fsmradius"));

        let overridden = WorkflowConfig {
            env: DeployEnv::Live,
            erp: ErpConfig {
                api_url: Some("http://localhost:9999/api".to_string()),
                ..ErpConfig::default()
            },
            ..WorkflowConfig::default()
        };
        assert_eq!(overridden.api_url(), "http://localhost:9999/api");
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("lws-fulfillment.toml");
        std::fs::write(
            &path,
            r#"
env = "LIVE"

[workflow]
max_orders_per_run = 25
eligibility_start_date = "2026-01-15"

[notifications]
admin = ["ops@example.com"]
"#,
        )?;

        let config = WorkflowConfig::load_from(&path)?;
        assert_eq!(config.env, DeployEnv::Live);
        assert_eq!(config.workflow.max_orders_per_run, 25);
        assert_eq!(
            config.workflow.eligibility_start_date,
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        );
        assert_eq!(config.notifications.admin, vec!["ops@example.com"]);
        // untouched sections keep their defaults
        assert_eq!(config.workflow.status_poll_attempts, 10);
        Ok(())
    }

    #[test]
    fn saved_config_round_trips_through_loader() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("saved.toml");
        let mut config = WorkflowConfig::default();
        config.workflow.archive_after_days = 45;
        config.save_to_file(&path)?;

        let loaded = WorkflowConfig::load_from(&path)?;
        assert_eq!(loaded.workflow.archive_after_days, 45);
        Ok(())
    }
}
