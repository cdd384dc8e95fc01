//! Record store interface.
//!
//! The relational schema behind the product is consumed here as a small
//! set of keyed operations. Implementations must make
//! [`RecordStore::decrement_balance`] atomic with respect to concurrent
//! decrements on the same owner.

use async_trait::async_trait;

use mylo_models::{ClipArtifact, ClipId, JobId, JobRecord, JobStatus, OwnerId};

use crate::error::StoreResult;

/// Partial update of a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub uploaded: Option<bool>,
    pub source_key: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn uploaded(source_key: Option<String>) -> Self {
        Self {
            uploaded: Some(true),
            source_key,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.uploaded.is_none() && self.source_key.is_none()
    }
}

/// Outcome of an atomic balance decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    /// Balance before the decrement
    pub before: u32,
    /// Amount actually removed: `min(before, requested)`
    pub deducted: u32,
    /// Balance after the decrement
    pub after: u32,
}

impl BalanceChange {
    /// Compute a capped decrement.
    pub fn capped(before: u32, requested: u32) -> Self {
        let deducted = before.min(requested);
        Self {
            before,
            deducted,
            after: before - deducted,
        }
    }
}

/// Durable storage for job records, clips and credit balances.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a job record. Fails if the ID is taken.
    async fn insert_job(&self, job: JobRecord) -> StoreResult<()>;

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<JobRecord>>;

    /// Apply a partial update. Fails with `NotFound` for unknown jobs.
    async fn update_job(&self, id: &JobId, update: JobUpdate) -> StoreResult<()>;

    /// Current credit balance. Fails with `NotFound` for unknown owners.
    async fn get_balance(&self, owner: &OwnerId) -> StoreResult<u32>;

    /// Create or overwrite an owner's balance.
    async fn set_balance(&self, owner: &OwnerId, credits: u32) -> StoreResult<()>;

    /// Atomically remove `min(balance, by)` credits.
    async fn decrement_balance(&self, owner: &OwnerId, by: u32) -> StoreResult<BalanceChange>;

    /// Atomically return credits to an existing owner. Returns the new balance.
    async fn increment_balance(&self, owner: &OwnerId, by: u32) -> StoreResult<u32>;

    /// Bulk-create clips. Clips whose ID already exists are skipped, so a
    /// replayed ingest does not duplicate rows. Returns the number inserted.
    async fn create_artifacts(&self, clips: Vec<ClipArtifact>) -> StoreResult<usize>;

    async fn get_artifact(&self, id: &ClipId) -> StoreResult<Option<ClipArtifact>>;

    /// Clips of a job, oldest first.
    async fn list_artifacts(&self, job: &JobId) -> StoreResult<Vec<ClipArtifact>>;
}
