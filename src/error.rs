//! Error types for the remote gateways and the content cache.

use thiserror::Error;

/// Failure of a hosting API call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("GitHub request failed: {0}")]
    Transport(#[from] octocrab::Error),

    #[error("GitHub request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected payload: {0}")]
    Decode(String),
}

/// Failure of a completion service call.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service returned HTTP {status}: {snippet}")]
    Status {
        status: reqwest::StatusCode,
        snippet: String,
    },

    #[error("completion service returned no text")]
    EmptyOutput,
}

/// Failure of a content cache operation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cache key {0:?} already stored")]
    DuplicateKey(String),
}
