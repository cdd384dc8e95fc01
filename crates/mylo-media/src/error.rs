//! Media client error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for media client operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur when talking to the processing service or the
/// media library.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MediaError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::Upstream { status, .. } => *status >= 500 || *status == 429,
            MediaError::Timeout(_) => true,
            MediaError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_classification() {
        assert!(MediaError::upstream(503, "unavailable").is_retryable());
        assert!(MediaError::upstream(429, "slow down").is_retryable());
        assert!(!MediaError::upstream(400, "bad request").is_retryable());
        assert!(!MediaError::config("missing endpoint").is_retryable());
    }
}
