//! API error taxonomy: transport failures are retried, status failures
//! never are, and analytics paths swallow everything.

use serde_json::Value;
use thiserror::Error;

/// Transport-level failure, produced by [`crate::HttpFetch`] adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

/// Typed client error surfaced to callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failed after exhausting retries.
    #[error("request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: FetchError,
    },
    /// Non-2xx response; carries the status and parsed body.
    #[error("API responded {status}")]
    Status { status: u16, body: Value },
    /// 2xx envelope with `success: false`.
    #[error("API rejected request: {message}")]
    Rejected { message: String },
    /// Body did not match the expected shape.
    #[error("failed to decode API response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
