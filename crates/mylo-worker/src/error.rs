//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Step name used twice in one run: {0}")]
    DuplicateStep(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient credits: owner {owner} has {balance}")]
    InsufficientCredits { owner: String, balance: u32 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Step output could not be replayed: {0}")]
    Replay(String),

    #[error("Gate closed before admission for {0}")]
    GateClosed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Model error: {0}")]
    Model(#[from] mylo_models::ModelError),

    #[error("Store error: {0}")]
    Store(#[from] mylo_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] mylo_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] mylo_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound(job_id.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if a whole-instance retry could help.
    ///
    /// Missing records, programming errors and rejected requests fail
    /// the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::JobNotFound(_)
            | WorkerError::DuplicateStep(_)
            | WorkerError::Unauthorized(_)
            | WorkerError::InsufficientCredits { .. }
            | WorkerError::InvalidRequest(_)
            | WorkerError::Replay(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Model(_) => false,
            WorkerError::Store(e) => !e.is_not_found(),
            _ => true,
        }
    }

    /// Check if the error means the job record does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkerError::JobNotFound(_) => true,
            WorkerError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}
