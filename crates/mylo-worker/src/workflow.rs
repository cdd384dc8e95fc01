//! The "process job" workflow.
//!
//! check-credits, then either set-status-no-credits, or
//! set-status-processing, process-video, create-clips, deduct-credits,
//! set-status-processed. A failure after the final attempt marks the job
//! `failed`, unless the job itself does not exist.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use mylo_media::{MediaLibrary, ProcessResponse, ProcessingClient};
use mylo_models::{
    validate_segments, ClipArtifact, InstanceKey, JobId, JobStatus, OwnerId, ProcessJobTrigger,
    ProcessingOptions,
};
use mylo_store::{JobUpdate, RecordStore};

use crate::error::{WorkerError, WorkerResult};
use crate::executor::Workflow;
use crate::ingest::{clip_id, derived_media, parse_ingest, IngestPlan};
use crate::logging::JobLogger;
use crate::metrics;
use crate::step::StepContext;

/// Output of the `check-credits` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCheck {
    pub owner_id: OwnerId,
    pub credits: u32,
    pub source_key: String,
    pub media_namespace: String,
}

/// Result of one completed "process job" instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessJobOutput {
    pub status: JobStatus,
    pub clips_created: usize,
    pub credits_deducted: u32,
}

pub struct ProcessJobWorkflow {
    store: Arc<dyn RecordStore>,
    processing: ProcessingClient,
    library: Arc<dyn MediaLibrary>,
    options: ProcessingOptions,
}

impl ProcessJobWorkflow {
    pub fn new(
        store: Arc<dyn RecordStore>,
        processing: ProcessingClient,
        library: Arc<dyn MediaLibrary>,
    ) -> Self {
        Self {
            store,
            processing,
            library,
            options: ProcessingOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn check_credits(&self, job_id: &JobId) -> WorkerResult<CreditCheck> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| WorkerError::job_not_found(job_id.as_str()))?;
        let credits = match self.store.get_balance(&job.owner_id).await {
            Ok(balance) => balance,
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(CreditCheck {
            media_namespace: job.media_namespace().to_string(),
            owner_id: job.owner_id,
            credits,
            source_key: job.source_key,
        })
    }

    /// Write a status if the stored one allows it. Re-writing the stored
    /// status is a no-op.
    async fn set_status(&self, job_id: &JobId, status: JobStatus) -> WorkerResult<JobStatus> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| WorkerError::job_not_found(job_id.as_str()))?;

        if job.status == status {
            return Ok(status);
        }
        job.status.transition(status)?;

        self.store.update_job(job_id, JobUpdate::status(status)).await?;
        info!(job_id = %job_id, from = %job.status, to = %status, "Job status updated");
        Ok(status)
    }

    async fn process_video(&self, source_key: &str) -> WorkerResult<ProcessResponse> {
        Ok(self.processing.process(source_key, &self.options).await?)
    }

    async fn create_clips(
        &self,
        instance: &InstanceKey,
        job_id: &JobId,
        check: &CreditCheck,
        body: &Value,
    ) -> WorkerResult<usize> {
        let clips: Vec<ClipArtifact> = match parse_ingest(body) {
            IngestPlan::Structured(descriptors) => descriptors
                .into_iter()
                .enumerate()
                .map(|(index, descriptor)| {
                    if let Some(segments) = &descriptor.transcript_segments {
                        if let Err(e) = validate_segments(segments) {
                            warn!(job_id = %job_id, index, "Clip transcript out of order: {}", e);
                        }
                    }
                    descriptor.into_artifact(
                        clip_id(instance, index),
                        job_id.clone(),
                        check.owner_id.clone(),
                    )
                })
                .collect(),
            IngestPlan::Fallback => {
                let keys = derived_media(self.library.list(&check.media_namespace).await);
                info!(
                    job_id = %job_id,
                    namespace = %check.media_namespace,
                    found = keys.len(),
                    "No structured clips in response, listed media library"
                );
                keys.into_iter()
                    .enumerate()
                    .map(|(index, key)| {
                        let mut clip = ClipArtifact::new(job_id.clone(), check.owner_id.clone(), key);
                        clip.id = clip_id(instance, index);
                        clip
                    })
                    .collect()
            }
        };

        let count = clips.len();
        let inserted = self.store.create_artifacts(clips).await?;
        metrics::record_clips_created(inserted);
        Ok(count)
    }

    async fn deduct_credits(&self, owner_id: &OwnerId, amount: u32) -> WorkerResult<u32> {
        if amount == 0 {
            return Ok(0);
        }
        let change = self.store.decrement_balance(owner_id, amount).await?;
        metrics::record_credits_deducted(change.deducted);
        info!(
            owner_id = %owner_id,
            deducted = change.deducted,
            remaining = change.after,
            "Credits deducted"
        );
        Ok(change.deducted)
    }
}

#[async_trait]
impl Workflow for ProcessJobWorkflow {
    type Input = ProcessJobTrigger;
    type Output = ProcessJobOutput;

    fn name(&self) -> &'static str {
        "process_job"
    }

    async fn run(
        &self,
        ctx: &mut StepContext,
        trigger: &ProcessJobTrigger,
    ) -> WorkerResult<ProcessJobOutput> {
        let logger = JobLogger::new(ctx.instance(), self.name());
        logger.log_start(&format!("attempt {}", ctx.attempt()));

        let job_id = &trigger.job_id;
        let check: CreditCheck = ctx.run("check-credits", self.check_credits(job_id)).await?;
        if check.owner_id != trigger.owner_id {
            logger.log_warning(&format!(
                "trigger owner {} differs from job owner {}",
                trigger.owner_id, check.owner_id
            ));
        }

        if check.credits == 0 {
            ctx.run("set-status-no-credits", self.set_status(job_id, JobStatus::NoCredits))
                .await?;
            logger.log_completion("owner has no credits");
            return Ok(ProcessJobOutput {
                status: JobStatus::NoCredits,
                clips_created: 0,
                credits_deducted: 0,
            });
        }

        ctx.run("set-status-processing", self.set_status(job_id, JobStatus::Processing))
            .await?;

        let response: ProcessResponse = ctx
            .run("process-video", self.process_video(&check.source_key))
            .await?;
        logger.log_progress(&format!("processing service answered {}", response.status));

        let instance = ctx.instance().clone();
        let clips_created: usize = ctx
            .run_with_input(
                "create-clips",
                &check.media_namespace,
                self.create_clips(&instance, job_id, &check, &response.body),
            )
            .await?;

        let amount = check.credits.min(u32::try_from(clips_created).unwrap_or(u32::MAX));
        let credits_deducted: u32 = ctx
            .run("deduct-credits", self.deduct_credits(&check.owner_id, amount))
            .await?;

        ctx.run("set-status-processed", self.set_status(job_id, JobStatus::Processed))
            .await?;

        logger.log_completion(&format!(
            "{} clips created, {} credits deducted",
            clips_created, credits_deducted
        ));
        Ok(ProcessJobOutput {
            status: JobStatus::Processed,
            clips_created,
            credits_deducted,
        })
    }

    async fn on_failure(&self, trigger: &ProcessJobTrigger, error: &WorkerError) -> WorkerResult<()> {
        if matches!(error, WorkerError::JobNotFound(_)) {
            warn!(job_id = %trigger.job_id, "Job does not exist, no status written");
            return Ok(());
        }
        JobLogger::new(&trigger.instance, "process_job")
            .log_error(&format!("Giving up, marking job failed: {}", error));
        self.set_status(&trigger.job_id, JobStatus::Failed).await?;
        Ok(())
    }
}
