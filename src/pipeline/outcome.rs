use thiserror::Error;

use super::step::{Completion, HoldKind, Step};
use crate::gateway::{ApiFailure, GatewayError};
use crate::gates::SubstrateMismatch;
use crate::store::{ApiDiagnostics, StoreError};

/// An intentional pause
#[derive(Debug, Clone, PartialEq)]
pub struct Hold {
    pub kind: HoldKind,
    /// Kept verbatim; remote rejection texts are not rewritten
    pub reason: String,
    /// Items created in WAIT before the hold, for post-run price codes
    pub created_items: Vec<String>,
    pub api: Option<ApiFailure>,
}

impl Hold {
    pub fn new(kind: HoldKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            created_items: Vec::new(),
            api: None,
        }
    }

    pub fn with_items(mut self, items: Vec<String>) -> Self {
        self.created_items = items;
        self
    }

    pub fn with_api(mut self, api: Option<ApiFailure>) -> Self {
        self.api = api;
        self
    }
}

/// A failure recorded against the step that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub step: Step,
    pub message: String,
    pub api: Option<ApiFailure>,
    pub substrate: Option<SubstrateMismatch>,
}

impl Failure {
    pub fn new(step: Step, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            api: None,
            substrate: None,
        }
    }

    pub fn from_error(step: Step, error: &StepError) -> Self {
        Self {
            step,
            message: error.to_string(),
            api: error.api_failure().cloned(),
            substrate: None,
        }
    }

    pub fn diagnostics(&self) -> Option<ApiDiagnostics> {
        self.api.as_ref().map(ApiDiagnostics::from)
    }
}

/// Result of running one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advanced(Step),
    Held(Hold),
    Failed(Failure),
    Terminal(Completion),
}

/// Result of driving one order in one run
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// Already COMPLETE (or removed); nothing was touched
    Skipped,
    Completed(Completion),
    Held(Hold),
    Failed(Failure),
}

impl OrderOutcome {
    pub fn created_items(&self) -> &[String] {
        match self {
            OrderOutcome::Held(hold) => &hold.created_items,
            _ => &[],
        }
    }
}

/// Errors raised inside a step
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Local store trouble; never recorded as an order failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Remote data that cannot be acted on
    #[error("{0}")]
    Data(String),
}

impl StepError {
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            StepError::Gateway(e) => e.api_failure(),
            _ => None,
        }
    }
}
