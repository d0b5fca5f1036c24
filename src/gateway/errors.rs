use std::fmt;
use thiserror::Error;

use crate::store::ApiDiagnostics;

/// A response the remote system answered but refused
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiFailure {
    pub entity: String,
    pub status: Option<i64>,
    /// First meaningful message, or a summary when none was given
    pub message: String,
    pub messages: Vec<String>,
    pub raw: String,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} rejected (status={}): {}", self.entity, status, self.message),
            None => write!(f, "{} rejected: {}", self.entity, self.message),
        }
    }
}

impl From<&ApiFailure> for ApiDiagnostics {
    fn from(failure: &ApiFailure) -> Self {
        ApiDiagnostics {
            entity: Some(failure.entity.clone()),
            status: failure.status,
            message: Some(failure.message.clone()),
            messages: failure.messages.clone(),
            raw: if failure.raw.is_empty() {
                None
            } else {
                Some(failure.raw.clone())
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{entity} transport error: {message}")]
    Transport {
        entity: String,
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    #[error("{0}")]
    Domain(ApiFailure),

    #[error("query {name} failed: {message}")]
    Query {
        name: String,
        message: String,
        transient: bool,
    },

    #[error("could not decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error("{context} is missing {field}")]
    MissingField { context: String, field: String },

    #[error("no site-B lines visible for sales order {sales_order}; shipping request cannot be created yet")]
    LinesNotVisible { sales_order: i64 },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Transport-level failures worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport { transient, .. } => *transient,
            GatewayError::Query { transient, .. } => *transient,
            _ => false,
        }
    }

    /// The remote refusal behind this error, if any
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            GatewayError::Domain(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn from_reqwest(entity: &str, error: reqwest::Error) -> Self {
        let status = error.status().map(|s| s.as_u16());
        let transient = error.is_timeout()
            || error.is_connect()
            || error.is_request()
            || status.is_some_and(is_transient_status);
        GatewayError::Transport {
            entity: entity.to_string(),
            status,
            message: error.to_string(),
            transient,
        }
    }

    pub fn from_http_status(entity: &str, status: u16, body: &str) -> Self {
        let mut message = format!("HTTP {status}");
        let body = body.trim();
        if !body.is_empty() {
            let snippet: String = body.chars().take(300).collect();
            message.push_str(": ");
            message.push_str(&snippet);
        }
        GatewayError::Transport {
            entity: entity.to_string(),
            status: Some(status),
            message,
            transient: is_transient_status(status),
        }
    }

    pub fn from_sqlx(name: &str, error: sqlx::Error) -> Self {
        let transient = matches!(
            error,
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
        );
        GatewayError::Query {
            name: name.to_string(),
            message: error.to_string(),
            transient,
        }
    }

    pub fn missing(context: impl Into<String>, field: impl Into<String>) -> Self {
        GatewayError::MissingField {
            context: context.into(),
            field: field.into(),
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..600).contains(&status)
}
