//! Interpretation of the processing service response.

use serde_json::Value;
use tracing::debug;

use mylo_media::ClipDescriptor;
use mylo_models::{ClipId, InstanceKey, ORIGINAL_MEDIA_SUFFIX};

/// How clips are discovered after processing.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestPlan {
    /// The service described its clips.
    Structured(Vec<ClipDescriptor>),
    /// No usable description; list the media library instead.
    Fallback,
}

/// Decide the ingest path from a response body.
///
/// An absent, empty or malformed `clips` list selects the fallback.
pub fn parse_ingest(body: &Value) -> IngestPlan {
    let Some(clips) = body.get("clips") else {
        return IngestPlan::Fallback;
    };

    match serde_json::from_value::<Vec<ClipDescriptor>>(clips.clone()) {
        Ok(descriptors) if !descriptors.is_empty() => IngestPlan::Structured(descriptors),
        Ok(_) => IngestPlan::Fallback,
        Err(e) => {
            debug!("Unparseable clips list, using fallback: {}", e);
            IngestPlan::Fallback
        }
    }
}

/// Keep listed media that are derived clips, not the uploaded original.
pub fn derived_media(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .filter(|key| !key.ends_with(ORIGINAL_MEDIA_SUFFIX))
        .collect()
}

/// Deterministic ID for the `index`-th clip of an instance, so a replayed
/// ingest step writes the same rows.
pub fn clip_id(instance: &InstanceKey, index: usize) -> ClipId {
    ClipId::from_string(format!("{}-{}", instance.as_str().replace(':', "-"), index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mylo_models::JobId;
    use serde_json::json;

    #[test]
    fn test_structured_clips() {
        let body = json!({
            "clips": [
                {"cloudinary_public_id": "mylo-videos/abc_clip_0", "titles": ["One"]},
                {"cloudinary_public_id": "mylo-videos/abc_clip_1"}
            ],
            "total_clips": 2
        });

        match parse_ingest(&body) {
            IngestPlan::Structured(clips) => {
                assert_eq!(clips.len(), 2);
                assert_eq!(clips[0].titles, Some(vec!["One".to_string()]));
            }
            IngestPlan::Fallback => panic!("expected structured clips"),
        }
    }

    #[test]
    fn test_fallback_cases() {
        assert_eq!(parse_ingest(&Value::Null), IngestPlan::Fallback);
        assert_eq!(parse_ingest(&json!({"status": "ok"})), IngestPlan::Fallback);
        assert_eq!(parse_ingest(&json!({"clips": []})), IngestPlan::Fallback);
        assert_eq!(parse_ingest(&json!({"clips": "three"})), IngestPlan::Fallback);
        assert_eq!(parse_ingest(&json!({"clips": [42]})), IngestPlan::Fallback);
    }

    #[test]
    fn test_derived_media_excludes_original() {
        let keys = vec![
            "mylo-videos/abc/original".to_string(),
            "mylo-videos/abc_clip_0".to_string(),
            "mylo-videos/abc_clip_1".to_string(),
        ];
        assert_eq!(
            derived_media(keys),
            vec!["mylo-videos/abc_clip_0", "mylo-videos/abc_clip_1"]
        );
    }

    #[test]
    fn test_clip_ids_are_deterministic() {
        let instance = InstanceKey::from_string("job-1:abc");
        assert_eq!(clip_id(&instance, 0).as_str(), "job-1-abc-0");
        assert_eq!(clip_id(&instance, 0), clip_id(&instance, 0));
        assert_ne!(
            clip_id(&InstanceKey::for_job(&JobId::from("job-1")), 0),
            clip_id(&instance, 0)
        );
    }
}
