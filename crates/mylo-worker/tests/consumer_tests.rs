//! Stream consumer against a live Redis.

mod common;

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{clips_body, Harness, PROCESS_PATH};
use mylo_models::{JobStatus, ProcessJobTrigger};
use mylo_queue::{JobQueue, QueueConfig};
use mylo_store::RecordStore;
use mylo_worker::{TriggerConsumer, WorkerConfig};

fn test_queue_config() -> QueueConfig {
    let suffix = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    QueueConfig {
        stream_name: format!("mylo-test:triggers:{}", suffix),
        dlq_stream_name: format!("mylo-test:dlq:{}", suffix),
        key_prefix: format!("mylo-test:{}", suffix),
        ..QueueConfig::from_env()
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_consumed_trigger_is_processed_and_acked() {
    let h = Harness::start().await;
    let job = h.seed_job("owner-1", "abc", 3).await;

    Mock::given(method("POST"))
        .and(path(PROCESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(clips_body("abc", 2)))
        .expect(1)
        .mount(&h.server)
        .await;

    let queue_config = test_queue_config();
    let producer = JobQueue::new(queue_config.clone()).unwrap();
    producer.init().await.unwrap();
    producer
        .enqueue(&ProcessJobTrigger::new(job.id.clone(), job.owner_id.clone()))
        .await
        .unwrap();

    let config = WorkerConfig {
        consume_block: Duration::from_millis(100),
        shutdown_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    };
    let consumer = Arc::new(TriggerConsumer::new(
        config,
        JobQueue::new(queue_config).unwrap(),
        h.dispatcher(),
    ));
    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.run().await })
    };

    let mut status = JobStatus::Queued;
    for _ in 0..100 {
        status = h.store.get_job(&job.id).await.unwrap().unwrap().status;
        if status == JobStatus::Processed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, JobStatus::Processed);

    // Ack happens right after the instance ends.
    tokio::time::sleep(Duration::from_millis(200)).await;
    consumer.shutdown();
    running.await.unwrap().unwrap();

    assert_eq!(producer.len().await.unwrap(), 0);
    assert_eq!(h.store.artifact_count(), 2);
}
