//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for workflow instances with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use mylo_models::{InstanceKey, JobId};

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job ID, the workflow instance and the
/// operation, so one run can be followed across retries and resumptions.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    instance: String,
    operation: String,
}

impl JobLogger {
    /// Create a logger for one workflow instance.
    pub fn new(instance: &InstanceKey, operation: &str) -> Self {
        Self {
            job_id: instance.job_id().to_string(),
            instance: instance.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Create a logger for work that is not tied to an instance.
    pub fn for_job(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            instance: String::new(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            instance = %self.instance,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            instance = %self.instance,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            instance = %self.instance,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            instance = %self.instance,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            instance = %self.instance,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this instance.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            instance = %self.instance,
            operation = %self.operation
        )
    }
}
