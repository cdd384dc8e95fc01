//! Structured clip metadata returned by the processing service.

use serde::{Deserialize, Serialize};

use mylo_models::{ClipArtifact, ClipId, JobId, OwnerId, TranscriptSegment};

/// One rendered clip as described by the processing service.
///
/// Every field is optional on the wire. A descriptor without a media key
/// still becomes a clip, with an empty key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipDescriptor {
    #[serde(rename = "cloudinary_public_id", alias = "source_reference", default)]
    pub media_key: Option<String>,
    #[serde(default)]
    pub titles: Option<Vec<String>>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Option<Vec<String>>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub transcript_segments: Option<Vec<TranscriptSegment>>,
    #[serde(alias = "thumbnail", default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub original_start: Option<f64>,
    #[serde(default)]
    pub original_end: Option<f64>,
    #[serde(rename = "source_video_key", default)]
    pub source_media_key: Option<String>,
}

impl ClipDescriptor {
    pub fn with_media_key(key: impl Into<String>) -> Self {
        Self {
            media_key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Build the clip artifact for this descriptor.
    pub fn into_artifact(self, id: ClipId, job_id: JobId, owner_id: OwnerId) -> ClipArtifact {
        let mut clip = ClipArtifact::new(job_id, owner_id, self.media_key.unwrap_or_default());
        clip.id = id;
        clip.titles = self.titles;
        clip.caption = self.caption;
        clip.hashtags = self.hashtags;
        clip.transcript = self.transcript;
        clip.transcript_segments = self.transcript_segments;
        clip.thumbnail_url = self.thumbnail_url;
        clip.original_start = self.original_start;
        clip.original_end = self.original_end;
        clip.source_media_key = self.source_media_key;
        clip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_aliases() {
        let descriptor: ClipDescriptor = serde_json::from_value(json!({
            "source_reference": "mylo-videos/abc_clip_0",
            "thumbnail": "https://cdn.example/thumb.jpg",
            "source_video_key": "abc/original",
            "original_start": 12.5,
            "original_end": 40.0
        }))
        .unwrap();

        assert_eq!(descriptor.media_key.as_deref(), Some("mylo-videos/abc_clip_0"));
        assert_eq!(descriptor.thumbnail_url.as_deref(), Some("https://cdn.example/thumb.jpg"));
        assert_eq!(descriptor.source_media_key.as_deref(), Some("abc/original"));
    }

    #[test]
    fn test_into_artifact_inherits_job_and_owner() {
        let descriptor = ClipDescriptor {
            titles: Some(vec!["Best moment".into()]),
            transcript_segments: Some(vec![TranscriptSegment::new("hi", 0.0, 0.3)]),
            ..ClipDescriptor::with_media_key("mylo-videos/abc_clip_1")
        };

        let clip = descriptor.into_artifact(
            ClipId::from("clip-1"),
            JobId::from("job-1"),
            OwnerId::from("owner-1"),
        );
        assert_eq!(clip.id.as_str(), "clip-1");
        assert_eq!(clip.job_id.as_str(), "job-1");
        assert_eq!(clip.owner_id.as_str(), "owner-1");
        assert_eq!(clip.media_key, "mylo-videos/abc_clip_1");
        assert!(clip.has_metadata());
    }

    #[test]
    fn test_missing_media_key_is_empty() {
        let clip = ClipDescriptor::default().into_artifact(
            ClipId::new(),
            JobId::from("job-1"),
            OwnerId::from("owner-1"),
        );
        assert_eq!(clip.media_key, "");
        assert!(!clip.has_metadata());
    }
}
