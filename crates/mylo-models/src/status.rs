//! Job status projection.
//!
//! The dashboard reads this value directly from the record store; the
//! workflow is the only writer. Wire tokens are stable and shared with
//! existing UI consumers, including the space in `"no credits"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Processing status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobStatus {
    /// Waiting for a workflow instance (also the initial/unset state)
    #[default]
    #[serde(rename = "queued")]
    Queued,
    /// External processing in flight
    #[serde(rename = "processing")]
    Processing,
    /// Clips created and credits deducted
    #[serde(rename = "processed")]
    Processed,
    /// Owner had no credits when the workflow started
    #[serde(rename = "no credits")]
    NoCredits,
    /// Workflow failed; resubmission is the only recovery
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Processed,
        JobStatus::NoCredits,
        JobStatus::Failed,
    ];

    /// Get the wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Processed => "processed",
            JobStatus::NoCredits => "no credits",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a stored value; an absent value is the initial state.
    pub fn from_stored(value: Option<&str>) -> Result<Self, ModelError> {
        match value {
            None | Some("") => Ok(JobStatus::Queued),
            Some(s) => s.parse(),
        }
    }

    /// Check if this is a terminal state (no more writes within a run).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Processed | JobStatus::NoCredits | JobStatus::Failed
        )
    }

    /// Whether a workflow run may move the job from `self` to `next`.
    ///
    /// Re-writing the current non-terminal status is allowed so that
    /// replayed status steps stay idempotent.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, to) if *from == to => !from.is_terminal(),
            (Queued, Processing | NoCredits | Failed) => true,
            (Processing, Processed | Failed) => true,
            _ => false,
        }
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, ModelError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Whether a new trigger may reset this job back to `Queued`.
    pub fn can_requeue(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::NoCredits)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownOption(format!("job status '{}'", s)))
    }
}
