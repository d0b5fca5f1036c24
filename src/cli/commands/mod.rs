use anyhow::Result;
use std::sync::Arc;

use crate::config::WorkflowConfig;
use crate::gateway::ErpGateway;
use crate::notify::{LogNotifier, NotificationGate};
use crate::runner::WorkflowRunner;
use crate::store::StateStore;

pub mod holds;
pub mod housekeeping;
pub mod orders;
pub mod run;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Open the local store only
pub async fn open_store(config: &WorkflowConfig) -> Result<StateStore> {
    Ok(StateStore::open(&config.store).await?)
}

pub fn notification_gate(config: &WorkflowConfig) -> NotificationGate {
    NotificationGate::new(Arc::new(LogNotifier), &config.notifications)
}

/// Store plus remote connections, for commands that talk to the order system
pub async fn with_runner<F, Fut, R>(config: &WorkflowConfig, f: F) -> Result<R>
where
    F: FnOnce(WorkflowRunner) -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    let store = open_store(config).await?;
    let gateway = ErpGateway::connect(config).await?;
    let runner = WorkflowRunner::new(
        Arc::new(gateway),
        store.clone(),
        notification_gate(config),
        config.clone(),
    );
    let result = f(runner).await;
    store.close().await;
    result
}
