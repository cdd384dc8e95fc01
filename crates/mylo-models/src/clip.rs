//! Clip artifacts produced by processing a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::{ClipId, JobId, OwnerId};

/// One word of a clip transcript with its timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSegment {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Check that every segment has `start <= end` and that starts never
/// decrease across the sequence.
pub fn validate_segments(segments: &[TranscriptSegment]) -> ModelResult<()> {
    let mut previous_start = f64::NEG_INFINITY;
    for (index, segment) in segments.iter().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() {
            return Err(ModelError::invalid_segment(index, "non-finite timestamp"));
        }
        if segment.start > segment.end {
            return Err(ModelError::invalid_segment(index, "start is after end"));
        }
        if segment.start < previous_start {
            return Err(ModelError::invalid_segment(index, "start precedes previous segment"));
        }
        previous_start = segment.start;
    }
    Ok(())
}

/// A derived clip. Immutable once created; edits produce a new clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipArtifact {
    /// Unique clip ID
    pub id: ClipId,
    /// Job the clip was cut from
    pub job_id: JobId,
    /// Owner (denormalized from the job)
    pub owner_id: OwnerId,
    /// Key of the rendered clip in the media store
    pub media_key: String,
    /// AI-generated title candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    /// Word-level transcript used by the text-based editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_segments: Option<Vec<TranscriptSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Start of the clip in the source video (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_start: Option<f64>,
    /// End of the clip in the source video (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_end: Option<f64>,
    /// Media key of the source the clip was rendered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_media_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ClipArtifact {
    /// Create a minimal clip carrying only its media key.
    pub fn new(job_id: JobId, owner_id: OwnerId, media_key: impl Into<String>) -> Self {
        Self {
            id: ClipId::new(),
            job_id,
            owner_id,
            media_key: media_key.into(),
            titles: None,
            caption: None,
            hashtags: None,
            transcript: None,
            transcript_segments: None,
            thumbnail_url: None,
            original_start: None,
            original_end: None,
            source_media_key: None,
            created_at: Utc::now(),
        }
    }

    /// Duration of the clip in the source, if provenance is known.
    pub fn source_duration(&self) -> Option<f64> {
        match (self.original_start, self.original_end) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }

    /// Whether the clip carries AI-generated metadata.
    pub fn has_metadata(&self) -> bool {
        self.titles.is_some() || self.caption.is_some() || self.transcript.is_some()
    }
}
