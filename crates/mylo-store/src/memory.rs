//! In-memory record store.
//!
//! Holds everything behind one mutex, which also makes balance
//! decrements atomic. Keeps a log of status writes so callers can
//! inspect how a job moved through its states.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use mylo_models::{ClipArtifact, ClipId, JobId, JobRecord, JobStatus, OwnerId};

use crate::error::{StoreError, StoreResult};
use crate::records::{BalanceChange, JobUpdate, RecordStore};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    balances: HashMap<OwnerId, u32>,
    clips: HashMap<ClipId, ClipArtifact>,
    clip_order: Vec<ClipId>,
    status_log: Vec<(JobId, JobStatus)>,
}

/// Record store backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::ConnectionFailed("record store mutex poisoned".into()))
    }

    /// Every status written for a job, in write order.
    pub fn status_history(&self, job: &JobId) -> Vec<JobStatus> {
        self.lock()
            .map(|inner| {
                inner
                    .status_log
                    .iter()
                    .filter(|(id, _)| id == job)
                    .map(|(_, status)| *status)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of clips across all jobs.
    pub fn artifact_count(&self) -> usize {
        self.lock().map(|inner| inner.clips.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_job(&self, job: JobRecord) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(format!("job {}", job.id)));
        }
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<JobRecord>> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    async fn update_job(&self, id: &JobId, update: JobUpdate) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("job {}", id)))?;

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(uploaded) = update.uploaded {
            job.uploaded = uploaded;
        }
        if let Some(source_key) = update.source_key {
            job.source_key = source_key;
        }
        job.updated_at = Utc::now();

        if let Some(status) = update.status {
            inner.status_log.push((id.clone(), status));
        }
        Ok(())
    }

    async fn get_balance(&self, owner: &OwnerId) -> StoreResult<u32> {
        self.lock()?
            .balances
            .get(owner)
            .copied()
            .ok_or_else(|| StoreError::not_found(format!("owner {}", owner)))
    }

    async fn set_balance(&self, owner: &OwnerId, credits: u32) -> StoreResult<()> {
        self.lock()?.balances.insert(owner.clone(), credits);
        Ok(())
    }

    async fn decrement_balance(&self, owner: &OwnerId, by: u32) -> StoreResult<BalanceChange> {
        let mut inner = self.lock()?;
        let balance = inner
            .balances
            .get_mut(owner)
            .ok_or_else(|| StoreError::not_found(format!("owner {}", owner)))?;
        let change = BalanceChange::capped(*balance, by);
        *balance = change.after;
        Ok(change)
    }

    async fn increment_balance(&self, owner: &OwnerId, by: u32) -> StoreResult<u32> {
        let mut inner = self.lock()?;
        let balance = inner
            .balances
            .get_mut(owner)
            .ok_or_else(|| StoreError::not_found(format!("owner {}", owner)))?;
        *balance = balance.saturating_add(by);
        Ok(*balance)
    }

    async fn create_artifacts(&self, clips: Vec<ClipArtifact>) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        let mut inserted = 0;
        for clip in clips {
            if inner.clips.contains_key(&clip.id) {
                continue;
            }
            inner.clip_order.push(clip.id.clone());
            inner.clips.insert(clip.id.clone(), clip);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get_artifact(&self, id: &ClipId) -> StoreResult<Option<ClipArtifact>> {
        Ok(self.lock()?.clips.get(id).cloned())
    }

    async fn list_artifacts(&self, job: &JobId) -> StoreResult<Vec<ClipArtifact>> {
        let inner = self.lock()?;
        Ok(inner
            .clip_order
            .iter()
            .filter_map(|id| inner.clips.get(id))
            .filter(|clip| &clip.job_id == job)
            .cloned()
            .collect())
    }
}
