// LWS Fulfillment Library - two-site order workflow orchestration
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod error;
pub mod gates;
pub mod gateway;
pub mod notify;
pub mod pipeline;
pub mod reconcile;
pub mod runner;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{DeployEnv, WorkflowConfig};
pub use error::{Result, WorkflowError};
pub use gates::{core_of, derive_dependent, ItemKind};
pub use gateway::{ErpGateway, GatewayError, RemoteOrderGateway, XLinkClient};
pub use notify::{NotificationGate, Notifier};
pub use pipeline::{OrderOutcome, PipelineExecutor, Step};
pub use reconcile::{ReconcileReport, ReconciliationMonitor};
pub use runner::{QueueOutcome, RunLock, RunSummary, WorkflowRunner};
pub use store::{OrderStatus, StateStore, StoreError};
pub use telemetry::{generate_run_id, init_telemetry};
