use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Errors from the LLM completion endpoint. The retry policy only cares
/// about one distinction: transient failures (rate limits, server errors)
/// are retried with backoff, everything else fails the call immediately.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    /// Rate-limit-class failures that warrant backoff and retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::ServerError(_)
        )
    }
}
