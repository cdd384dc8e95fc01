//! Text-based clip editing.
//!
//! An edit re-renders an existing clip keeping only the selected words.
//! It costs one credit and produces a new clip; the source clip is never
//! modified. Validation rejections happen before any write. The credit is
//! reserved before the render and returned when the render or the insert
//! fails, so concurrent edits cannot share one credit.

use std::sync::Arc;

use tracing::{error, info};

use mylo_media::ProcessingClient;
use mylo_models::{validate_segments, ClipArtifact, EditClipRequest, OwnerId, TranscriptSegment};
use mylo_store::RecordStore;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Credits charged per edit.
pub const EDIT_COST: u32 = 1;

pub struct ClipEditor {
    store: Arc<dyn RecordStore>,
    processing: ProcessingClient,
}

impl ClipEditor {
    pub fn new(store: Arc<dyn RecordStore>, processing: ProcessingClient) -> Self {
        Self { store, processing }
    }

    /// Edit a clip owned by `caller`, returning the new clip.
    pub async fn edit(&self, caller: &OwnerId, request: &EditClipRequest) -> WorkerResult<ClipArtifact> {
        let source = match self.store.get_artifact(&request.clip_id).await? {
            Some(clip) if clip.owner_id == *caller => clip,
            _ => {
                return Err(WorkerError::unauthorized(format!(
                    "clip {} not found for owner {}",
                    request.clip_id, caller
                )))
            }
        };

        let balance = match self.store.get_balance(caller).await {
            Ok(balance) => balance,
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e.into()),
        };
        if balance < EDIT_COST {
            return Err(WorkerError::InsufficientCredits {
                owner: caller.to_string(),
                balance,
            });
        }

        let kept = request.kept_segments();
        if kept.is_empty() {
            return Err(WorkerError::invalid_request("no segments kept"));
        }
        validate_segments(&kept).map_err(|e| WorkerError::invalid_request(e.to_string()))?;

        self.reserve_credit(caller).await?;

        let logger = JobLogger::for_job(&source.job_id, "edit_clip");
        logger.log_start(&format!("editing clip {} ({} words kept)", source.id, kept.len()));

        let clip = match self.render(caller, &source, request, kept).await {
            Ok(clip) => clip,
            Err(e) => {
                logger.log_error(&format!("edit failed, returning credit: {}", e));
                if let Err(refund) = self.store.increment_balance(caller, EDIT_COST).await {
                    error!(owner = %caller, "Failed to return edit credit: {}", refund);
                }
                return Err(e);
            }
        };
        metrics::record_credits_deducted(EDIT_COST);

        info!(source_clip = %source.id, new_clip = %clip.id, "Clip edited");
        logger.log_completion(&format!("created clip {}", clip.id));
        Ok(clip)
    }

    /// Take one credit, rejecting when the owner cannot cover it.
    async fn reserve_credit(&self, caller: &OwnerId) -> WorkerResult<()> {
        let change = match self.store.decrement_balance(caller, EDIT_COST).await {
            Ok(change) => change,
            Err(e) if e.is_not_found() => {
                return Err(WorkerError::InsufficientCredits {
                    owner: caller.to_string(),
                    balance: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if change.deducted < EDIT_COST {
            return Err(WorkerError::InsufficientCredits {
                owner: caller.to_string(),
                balance: change.before,
            });
        }
        Ok(())
    }

    async fn render(
        &self,
        caller: &OwnerId,
        source: &ClipArtifact,
        request: &EditClipRequest,
        kept: Vec<TranscriptSegment>,
    ) -> WorkerResult<ClipArtifact> {
        let response = self.processing.edit_clip(&source.media_key, request).await?;

        let mut clip = ClipArtifact::new(source.job_id.clone(), caller.clone(), response.media_key);
        clip.transcript = Some(if response.transcript.is_empty() {
            request.kept_transcript()
        } else {
            response.transcript
        });
        clip.titles = Some(response.titles);
        clip.caption = Some(response.caption);
        clip.hashtags = Some(response.hashtags);
        clip.transcript_segments = Some(kept);
        clip.original_start = source.original_start;
        clip.original_end = source.original_end;
        clip.source_media_key = source.source_media_key.clone();

        self.store.create_artifacts(vec![clip.clone()]).await?;
        Ok(clip)
    }
}
