//! Text-based clip edit requests.

use serde::{Deserialize, Serialize};

use crate::{CaptionStyle, ClipId, TranscriptSegment, TransitionStyle};

/// A transcript word flagged to keep or drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditSegment {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default = "default_keep")]
    pub keep: bool,
}

fn default_keep() -> bool {
    true
}

impl EditSegment {
    pub fn keep(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
            keep: true,
        }
    }

    pub fn remove(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            keep: false,
            ..Self::keep(word, start, end)
        }
    }
}

/// Request to re-render an existing clip from an edited transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditClipRequest {
    /// Clip to edit; must belong to the caller
    pub clip_id: ClipId,
    pub segments: Vec<EditSegment>,
    #[serde(default)]
    pub caption_style: CaptionStyle,
    #[serde(default)]
    pub transition_style: TransitionStyle,
}

impl EditClipRequest {
    pub fn new(clip_id: impl Into<ClipId>, segments: Vec<EditSegment>) -> Self {
        Self {
            clip_id: clip_id.into(),
            segments,
            caption_style: CaptionStyle::default(),
            transition_style: TransitionStyle::default(),
        }
    }

    pub fn with_caption_style(mut self, style: CaptionStyle) -> Self {
        self.caption_style = style;
        self
    }

    /// Segments flagged `keep`, in their original order.
    pub fn kept_segments(&self) -> Vec<TranscriptSegment> {
        self.segments
            .iter()
            .filter(|s| s.keep)
            .map(|s| TranscriptSegment::new(s.word.clone(), s.start, s.end))
            .collect()
    }

    /// Transcript text of the kept words.
    pub fn kept_transcript(&self) -> String {
        self.segments
            .iter()
            .filter(|s| s.keep)
            .map(|s| s.word.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kept_segments_preserve_order() {
        let request = EditClipRequest::new(
            "clip-1",
            vec![
                EditSegment::keep("so", 0.0, 0.2),
                EditSegment::remove("um", 0.2, 0.4),
                EditSegment::keep("today", 0.4, 0.8),
            ],
        );
        let kept = request.kept_segments();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].word, "today");
        assert_eq!(request.kept_transcript(), "so today");
    }

    #[test]
    fn test_keep_defaults_to_true() {
        let seg: EditSegment =
            serde_json::from_str(r#"{"word":"hi","start":0.0,"end":0.1}"#).unwrap();
        assert!(seg.keep);
    }
}
