//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::MockServer;

use mylo_media::{InMemoryLibrary, MediaLibrary, ProcessingClient, ProcessingConfig};
use mylo_models::{JobRecord, OwnerId};
use mylo_store::{InMemoryRecordStore, MemoryJournal, RecordStore, StepJournal};
use mylo_worker::{Dispatcher, ProcessJobWorkflow, RetryPolicy, StepExecutor};

pub const PROCESS_PATH: &str = "/process_video";
pub const EDIT_PATH: &str = "/edit_clip";
pub const AUTH_TOKEN: &str = "test-token";

/// In-memory collaborators around a mock processing service.
pub struct Harness {
    pub server: MockServer,
    pub store: Arc<InMemoryRecordStore>,
    pub journal: Arc<MemoryJournal>,
    pub library: Arc<InMemoryLibrary>,
}

impl Harness {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            store: Arc::new(InMemoryRecordStore::new()),
            journal: Arc::new(MemoryJournal::new()),
            library: Arc::new(InMemoryLibrary::new("mylo-videos")),
        }
    }

    pub fn processing(&self) -> ProcessingClient {
        let config = ProcessingConfig::new(format!("{}{}", self.server.uri(), PROCESS_PATH), AUTH_TOKEN)
            .with_timeout(Duration::from_secs(5));
        ProcessingClient::new(config).unwrap()
    }

    pub fn store_handle(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub fn journal_handle(&self) -> Arc<dyn StepJournal> {
        self.journal.clone()
    }

    pub fn workflow(&self) -> ProcessJobWorkflow {
        let library: Arc<dyn MediaLibrary> = self.library.clone();
        ProcessJobWorkflow::new(self.store_handle(), self.processing(), library)
    }

    pub fn executor(&self, max_attempts: u32) -> StepExecutor {
        StepExecutor::new(self.journal_handle(), RetryPolicy::immediate(max_attempts))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.executor(2), self.workflow(), 4)
    }

    /// Create a queued job for `owner` and set the owner's balance.
    pub async fn seed_job(&self, owner: &str, namespace: &str, credits: u32) -> JobRecord {
        let job = JobRecord::new(owner, format!("{}/original", namespace));
        self.store.insert_job(job.clone()).await.unwrap();
        self.store
            .set_balance(&OwnerId::from(owner), credits)
            .await
            .unwrap();
        job
    }

    /// Wait until the mock server has seen `count` requests.
    pub async fn wait_for_requests(&self, count: usize) {
        for _ in 0..200 {
            let seen = self.server.received_requests().await.map(|r| r.len()).unwrap_or(0);
            if seen >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("processing service never received {} requests", count);
    }
}

/// Processing response describing `count` clips under `namespace`.
pub fn clips_body(namespace: &str, count: usize) -> Value {
    let clips: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "cloudinary_public_id": format!("mylo-videos/{}/clip_{}", namespace, i),
                "titles": [format!("Clip {}", i)],
                "caption": "caption",
                "hashtags": ["#mylo"],
                "transcript": "hello world",
                "transcript_segments": [
                    {"word": "hello", "start": 0.0, "end": 0.4},
                    {"word": "world", "start": 0.5, "end": 0.9}
                ],
                "original_start": 10.0 * i as f64,
                "original_end": 10.0 * i as f64 + 8.0,
                "source_video_key": format!("{}/original", namespace)
            })
        })
        .collect();
    json!({ "clips": clips })
}
