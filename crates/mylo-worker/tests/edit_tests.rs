//! Clip edit flow: ownership, credits and segment validation.

mod common;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{Harness, EDIT_PATH};
use mylo_models::{ClipArtifact, EditClipRequest, EditSegment, OwnerId, TranscriptSegment};
use mylo_store::RecordStore;
use mylo_worker::{ClipEditor, WorkerError};

async fn seed_clip(h: &Harness, owner: &str, credits: u32) -> ClipArtifact {
    let job = h.seed_job(owner, "abc", credits).await;
    let mut clip = ClipArtifact::new(job.id, job.owner_id, "mylo-videos/abc/clip_0");
    clip.transcript = Some("so um hello world".into());
    clip.transcript_segments = Some(vec![
        TranscriptSegment::new("so", 0.0, 0.2),
        TranscriptSegment::new("um", 0.3, 0.5),
        TranscriptSegment::new("hello", 0.6, 0.9),
        TranscriptSegment::new("world", 1.0, 1.4),
    ]);
    clip.original_start = Some(12.0);
    clip.original_end = Some(40.0);
    clip.source_media_key = Some("abc/original".into());
    h.store.create_artifacts(vec![clip.clone()]).await.unwrap();
    clip
}

fn trim_filler(clip: &ClipArtifact) -> EditClipRequest {
    EditClipRequest::new(
        clip.id.clone(),
        vec![
            EditSegment::remove("so", 0.0, 0.2),
            EditSegment::remove("um", 0.3, 0.5),
            EditSegment::keep("hello", 0.6, 0.9),
            EditSegment::keep("world", 1.0, 1.4),
        ],
    )
}

#[tokio::test]
async fn test_edit_creates_new_clip_and_charges_one_credit() {
    let h = Harness::start().await;
    let source = seed_clip(&h, "owner-1", 2).await;

    Mock::given(method("POST"))
        .and(path(EDIT_PATH))
        .and(body_partial_json(json!({
            "cloudinary_public_id": "mylo-videos/abc/clip_0",
            "segments": [
                {"word": "so", "keep": false},
                {"word": "um", "keep": false},
                {"word": "hello", "keep": true},
                {"word": "world", "keep": true}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cloudinary_public_id": "mylo-videos/abc/clip_0_edit",
            "cloudinary_url": "https://res.cloudinary.com/demo/video/upload/clip_0_edit.mp4",
            "titles": ["Hello world"],
            "caption": "hello",
            "hashtags": ["#hello"]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let editor = ClipEditor::new(h.store_handle(), h.processing());
    let owner = OwnerId::from("owner-1");
    let clip = editor.edit(&owner, &trim_filler(&source)).await.unwrap();

    assert_ne!(clip.id, source.id);
    assert_eq!(clip.media_key, "mylo-videos/abc/clip_0_edit");
    assert_eq!(clip.transcript.as_deref(), Some("hello world"));
    assert_eq!(clip.transcript_segments.as_ref().map(Vec::len), Some(2));
    assert_eq!(clip.original_start, Some(12.0));
    assert_eq!(clip.source_media_key.as_deref(), Some("abc/original"));

    assert_eq!(h.store.get_balance(&owner).await.unwrap(), 1);
    assert_eq!(h.store.list_artifacts(&source.job_id).await.unwrap().len(), 2);

    let untouched = h.store.get_artifact(&source.id).await.unwrap().unwrap();
    assert_eq!(untouched, source);
}

#[tokio::test]
async fn test_edit_by_other_owner_is_unauthorized() {
    let h = Harness::start().await;
    let source = seed_clip(&h, "owner-1", 2).await;
    let intruder = OwnerId::from("owner-2");
    h.store.set_balance(&intruder, 5).await.unwrap();

    Mock::given(method("POST"))
        .and(path(EDIT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let editor = ClipEditor::new(h.store_handle(), h.processing());
    let err = editor.edit(&intruder, &trim_filler(&source)).await.unwrap_err();

    assert!(matches!(err, WorkerError::Unauthorized(_)));
    assert_eq!(h.store.get_balance(&intruder).await.unwrap(), 5);
    assert_eq!(h.store.get_balance(&source.owner_id).await.unwrap(), 2);
    assert_eq!(h.store.artifact_count(), 1);
}

#[tokio::test]
async fn test_edit_of_unknown_clip_is_unauthorized() {
    let h = Harness::start().await;
    let editor = ClipEditor::new(h.store_handle(), h.processing());

    let request = EditClipRequest::new("no-such-clip", vec![EditSegment::keep("hi", 0.0, 0.5)]);
    let err = editor.edit(&OwnerId::from("owner-1"), &request).await.unwrap_err();
    assert!(matches!(err, WorkerError::Unauthorized(_)));
}

#[tokio::test]
async fn test_edit_without_credits_is_rejected() {
    let h = Harness::start().await;
    let source = seed_clip(&h, "owner-1", 0).await;

    Mock::given(method("POST"))
        .and(path(EDIT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let editor = ClipEditor::new(h.store_handle(), h.processing());
    let err = editor
        .edit(&source.owner_id, &trim_filler(&source))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::InsufficientCredits { balance: 0, .. }));
    assert_eq!(h.store.artifact_count(), 1);
}

#[tokio::test]
async fn test_edit_keeping_nothing_is_invalid() {
    let h = Harness::start().await;
    let source = seed_clip(&h, "owner-1", 3).await;
    let editor = ClipEditor::new(h.store_handle(), h.processing());

    let request = EditClipRequest::new(
        source.id.clone(),
        vec![EditSegment::remove("so", 0.0, 0.2), EditSegment::remove("um", 0.3, 0.5)],
    );
    let err = editor.edit(&source.owner_id, &request).await.unwrap_err();

    assert!(matches!(err, WorkerError::InvalidRequest(_)));
    assert_eq!(h.store.get_balance(&source.owner_id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_edit_service_failure_returns_credit() {
    let h = Harness::start().await;
    let source = seed_clip(&h, "owner-1", 3).await;

    Mock::given(method("POST"))
        .and(path(EDIT_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&h.server)
        .await;

    let editor = ClipEditor::new(h.store_handle(), h.processing());
    let err = editor
        .edit(&source.owner_id, &trim_filler(&source))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::Media(_)));
    assert_eq!(h.store.get_balance(&source.owner_id).await.unwrap(), 3);
    assert_eq!(h.store.artifact_count(), 1);
}

#[tokio::test]
async fn test_concurrent_edits_cannot_share_last_credit() {
    let h = Harness::start().await;
    let source = seed_clip(&h, "owner-1", 1).await;

    Mock::given(method("POST"))
        .and(path(EDIT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "cloudinary_public_id": "mylo-videos/abc/clip_0_edit",
                    "titles": ["Hello world"],
                    "caption": "hello",
                    "hashtags": []
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let editor = ClipEditor::new(h.store_handle(), h.processing());
    let request = trim_filler(&source);
    let (a, b) = tokio::join!(
        editor.edit(&source.owner_id, &request),
        editor.edit(&source.owner_id, &request)
    );

    let (won, lost) = match (a, b) {
        (Ok(clip), Err(e)) | (Err(e), Ok(clip)) => (clip, e),
        other => panic!("expected exactly one edit to succeed, got {:?}", other),
    };
    assert_eq!(won.media_key, "mylo-videos/abc/clip_0_edit");
    assert!(matches!(lost, WorkerError::InsufficientCredits { .. }));
    assert_eq!(h.store.get_balance(&source.owner_id).await.unwrap(), 0);
    assert_eq!(h.store.artifact_count(), 2);
}
