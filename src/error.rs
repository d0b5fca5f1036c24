use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Errors that end a whole run rather than a single order
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote system error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("another workflow run holds the lock at {}", path.display())]
    RunInProgress { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
