//! Job records and the trigger payload that starts a workflow instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{InstanceKey, JobId, JobStatus, OwnerId};

/// Suffix of the media key that denotes the unprocessed upload.
pub const ORIGINAL_MEDIA_SUFFIX: &str = "original";

/// One unit of source media submitted for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,
    /// Owning account
    pub owner_id: OwnerId,
    /// Key of the source media in the external media store
    pub source_key: String,
    /// Name shown in the dashboard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Set once the upload finished and a trigger was sent
    #[serde(default)]
    pub uploaded: bool,
    /// Current status projection
    #[serde(default)]
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a queued job record.
    pub fn new(owner_id: impl Into<OwnerId>, source_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            source_key: source_key.into(),
            display_name: None,
            uploaded: false,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a specific job ID.
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Namespace of this job in the media store.
    ///
    /// Uploads are stored as `<namespace>/original`, and processed clips
    /// land next to them under the same namespace.
    pub fn media_namespace(&self) -> &str {
        self.source_key
            .split('/')
            .next()
            .unwrap_or(self.source_key.as_str())
    }
}

/// Payload that starts (or resumes) one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessJobTrigger {
    /// Workflow instance this trigger drives
    pub instance: InstanceKey,
    /// Job to process
    pub job_id: JobId,
    /// Owner, used as the concurrency partition key
    pub owner_id: OwnerId,
    /// When the trigger was created
    pub created_at: DateTime<Utc>,
}

impl ProcessJobTrigger {
    /// Create a trigger with a freshly allocated instance key.
    pub fn new(job_id: impl Into<JobId>, owner_id: impl Into<OwnerId>) -> Self {
        let job_id = job_id.into();
        Self {
            instance: InstanceKey::for_job(&job_id),
            job_id,
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("process:{}:{}", self.owner_id, self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_namespace() {
        let job = JobRecord::new("user-1", "0b7c/original");
        assert_eq!(job.media_namespace(), "0b7c");

        let youtube = JobRecord::new("user-1", "youtube/dQw4w9WgXcQ");
        assert_eq!(youtube.media_namespace(), "youtube");

        let flat = JobRecord::new("user-1", "flatkey");
        assert_eq!(flat.media_namespace(), "flatkey");
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = JobRecord::new("user-1", "abc/original").with_id("job-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.id.as_str(), "job-1");
        assert!(!job.uploaded);
    }

    #[test]
    fn test_trigger_idempotency_key() {
        let trigger = ProcessJobTrigger::new("job-1", "user-1");
        assert_eq!(trigger.idempotency_key(), "process:user-1:job-1");
        assert_eq!(trigger.instance.job_id().as_str(), "job-1");
    }

    #[test]
    fn test_missing_status_deserializes_as_queued() {
        let json = serde_json::json!({
            "id": "job-1",
            "owner_id": "user-1",
            "source_key": "abc/original",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        });
        let job: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }
}
