use std::time::Duration;
use thiserror::Error;

use crate::status::ArticleStatus;

/// Store failures. `StaleTransition` is the normal outcome of losing a
/// compare-and-swap race and is handled, not logged as a fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article with url {url} already exists")]
    DuplicateKey { url: String },

    #[error("article {id} is {actual}, expected one of {expected:?}")]
    StaleTransition {
        id: uuid::Uuid,
        actual: ArticleStatus,
        expected: Vec<ArticleStatus>,
    },

    #[error("article {0} not found")]
    NotFound(uuid::Uuid),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: ArticleStatus, to: ArticleStatus },

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Uniform failure taxonomy for every external service call. Adapters
/// classify; callers decide whether to back off, skip, or park the article.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl AdapterError {
    /// Network-layer errors from reqwest: timeouts and connection trouble
    /// are worth retrying, anything else is not.
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AdapterError::Transient(err.to_string())
        } else {
            AdapterError::Permanent(err.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::Transient(_)
        )
    }
}

/// A model reply that does not match the shape the prompt demanded.
#[derive(Debug, Error)]
#[error("unparseable model output: {reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        ParseError {
            reason: reason.into(),
        }
    }
}
