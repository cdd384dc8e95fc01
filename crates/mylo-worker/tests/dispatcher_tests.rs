//! Trigger submission: per-owner serialization, duplicates and requeue.

mod common;

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{clips_body, Harness, PROCESS_PATH};
use mylo_models::{JobStatus, OwnerId, ProcessJobTrigger};
use mylo_store::{JobUpdate, RecordStore, StepJournal};
use mylo_worker::Submission;

#[tokio::test]
async fn test_same_owner_instances_run_one_at_a_time() {
    let h = Harness::start().await;
    let first = h.seed_job("owner-1", "abc", 5).await;
    let second = h.seed_job("owner-1", "def", 5).await;

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(clips_body("abc", 1))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    let owner = OwnerId::from("owner-1");

    let a = dispatcher.submit(first.id.clone(), owner.clone()).await.unwrap();
    let b = dispatcher.submit(second.id.clone(), owner.clone()).await.unwrap();
    let instance_of = |s: &Submission| match s {
        Submission::Started { instance, .. } => instance.clone(),
        Submission::Duplicate { .. } => panic!("submission should start"),
    };
    let (a_instance, b_instance) = (instance_of(&a), instance_of(&b));

    h.wait_for_requests(1).await;
    assert!(dispatcher.gate().is_active("owner-1"));
    assert_eq!(dispatcher.gate().waiting("owner-1"), 1);
    assert!(h.journal.steps(&b_instance).await.unwrap().is_empty());
    let waiting = h.store.get_job(&second.id).await.unwrap().unwrap();
    assert_eq!(waiting.status, JobStatus::Queued);

    let a_outcome = a.wait().await.unwrap().unwrap();
    let b_outcome = b.wait().await.unwrap().unwrap();
    assert!(a_outcome.is_completed());
    assert!(b_outcome.is_completed());

    let a_last = h.journal.steps(&a_instance).await.unwrap().pop().unwrap();
    let b_first = h.journal.steps(&b_instance).await.unwrap().remove(0);
    assert_eq!(a_last.name, "set-status-processed");
    assert_eq!(b_first.name, "check-credits");
    assert!(a_last.completed_at <= b_first.completed_at);

    assert_eq!(h.server.received_requests().await.unwrap().len(), 2);
    assert_eq!(h.store.get_balance(&owner).await.unwrap(), 3);
    assert_eq!(dispatcher.gate().active_partitions(), 0);
}

#[tokio::test]
async fn test_different_owners_run_in_parallel() {
    let h = Harness::start().await;
    let first = h.seed_job("owner-1", "abc", 5).await;
    let second = h.seed_job("owner-2", "def", 5).await;

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(clips_body("abc", 1))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    let a = dispatcher.submit(first.id.clone(), first.owner_id.clone()).await.unwrap();
    let b = dispatcher.submit(second.id.clone(), second.owner_id.clone()).await.unwrap();

    h.wait_for_requests(2).await;
    assert_eq!(dispatcher.gate().active_partitions(), 2);

    let (a, b) = futures::future::join(a.wait(), b.wait()).await;
    assert!(a.unwrap().unwrap().is_completed());
    assert!(b.unwrap().unwrap().is_completed());
}

#[tokio::test]
async fn test_submitting_running_job_is_duplicate() {
    let h = Harness::start().await;
    let job = h.seed_job("owner-1", "abc", 5).await;

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(clips_body("abc", 1))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    let first = dispatcher.submit(job.id.clone(), job.owner_id.clone()).await.unwrap();
    let again = dispatcher.submit(job.id.clone(), job.owner_id.clone()).await.unwrap();

    assert!(!first.is_duplicate());
    assert!(again.is_duplicate());
    assert!(again.wait().await.unwrap().is_none());
    assert!(first.wait().await.unwrap().unwrap().is_completed());

    let processed = dispatcher.submit(job.id.clone(), job.owner_id.clone()).await.unwrap();
    assert!(processed.is_duplicate());
    assert_eq!(h.store.artifact_count(), 1);
}

#[tokio::test]
async fn test_failed_job_is_requeued_with_fresh_instance() {
    let h = Harness::start().await;
    let job = h.seed_job("owner-1", "abc", 5).await;
    h.store
        .update_job(&job.id, JobUpdate::status(JobStatus::Failed))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(clips_body("abc", 2)))
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    let outcome = dispatcher
        .submit(job.id.clone(), job.owner_id.clone())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap()
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        h.store.status_history(&job.id),
        vec![
            JobStatus::Failed,
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Processed
        ]
    );
}

#[tokio::test]
async fn test_dispatched_trigger_recovers_failed_job() {
    let h = Harness::start().await;
    let job = h.seed_job("owner-1", "abc", 3).await;
    h.store
        .update_job(&job.id, JobUpdate::status(JobStatus::Failed))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(clips_body("abc", 2)))
        .expect(1)
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    let outcome = dispatcher
        .dispatch(ProcessJobTrigger::new(job.id.clone(), job.owner_id.clone()))
        .wait()
        .await
        .unwrap()
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        h.store.status_history(&job.id),
        vec![
            JobStatus::Failed,
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Processed
        ]
    );
    assert_eq!(h.store.list_artifacts(&job.id).await.unwrap().len(), 2);
    assert_eq!(h.store.get_balance(&job.owner_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_redelivered_finished_trigger_keeps_failed_status() {
    let h = Harness::start().await;
    let job = h.seed_job("owner-1", "abc", 3).await;

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    let trigger = ProcessJobTrigger::new(job.id.clone(), job.owner_id.clone());
    let first = dispatcher.dispatch(trigger.clone()).wait().await.unwrap().unwrap();
    assert!(!first.is_completed());
    let requests = h.server.received_requests().await.unwrap().len();

    let replayed = dispatcher.dispatch(trigger).wait().await.unwrap().unwrap();
    assert!(!replayed.is_completed());
    assert_eq!(h.server.received_requests().await.unwrap().len(), requests);
    assert_eq!(
        h.store.status_history(&job.id),
        vec![JobStatus::Processing, JobStatus::Failed]
    );
}

#[tokio::test]
async fn test_gate_waiters_count_against_capacity() {
    let h = Harness::start().await;
    let first = h.seed_job("owner-1", "abc", 5).await;
    let second = h.seed_job("owner-1", "def", 5).await;

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(clips_body("abc", 1))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;

    let dispatcher = h.dispatcher();
    assert_eq!(dispatcher.capacity(), 4);

    let a = dispatcher.submit(first.id.clone(), first.owner_id.clone()).await.unwrap();
    let b = dispatcher.submit(second.id.clone(), second.owner_id.clone()).await.unwrap();
    h.wait_for_requests(1).await;

    assert_eq!(dispatcher.gate().waiting("owner-1"), 1);
    assert_eq!(dispatcher.available_slots(), 3);
    assert_eq!(dispatcher.capacity(), 2);

    a.wait().await.unwrap();
    b.wait().await.unwrap();
    assert_eq!(dispatcher.capacity(), 4);
}

#[tokio::test]
async fn test_unknown_job_still_starts_an_instance() {
    let h = Harness::start().await;
    let dispatcher = h.dispatcher();

    let submission = dispatcher
        .submit("ghost-job".into(), OwnerId::from("owner-1"))
        .await
        .unwrap();
    assert!(!submission.is_duplicate());

    let outcome = submission.wait().await.unwrap().unwrap();
    assert!(!outcome.is_completed());
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(dispatcher.in_flight(), 0);
}
