//! Trigger consumer: feeds stream-delivered triggers to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mylo_models::ProcessJobTrigger;
use mylo_queue::JobQueue;

use crate::config::WorkerConfig;
use crate::dispatcher::{Dispatcher, Submission};
use crate::error::WorkerResult;

/// Consumes triggers from the Redis stream until shut down.
pub struct TriggerConsumer {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    dispatcher: Arc<Dispatcher>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl TriggerConsumer {
    pub fn new(config: WorkerConfig, queue: JobQueue, dispatcher: Dispatcher) -> Self {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            dispatcher: Arc::new(dispatcher),
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Start consuming.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting trigger consumer '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_loop();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                }
                result = self.consume_triggers() => {
                    if let Err(e) = result {
                        error!("Error consuming triggers: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight instances to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_instances())
            .await
            .is_err()
        {
            warn!(
                "{} instances still running at shutdown; their triggers stay pending",
                self.dispatcher.in_flight()
            );
        }

        info!("Trigger consumer stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_claim_loop(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let dispatcher = Arc::clone(&self.dispatcher);
        let consumer_name = self.consumer_name.clone();
        let interval = self.config.claim_interval;
        let min_idle_ms = u64::try_from(self.config.claim_min_idle.as_millis()).unwrap_or(u64::MAX);
        let batch = self.config.consume_batch;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match queue.claim_pending(&consumer_name, min_idle_ms, batch).await {
                            Ok(triggers) if !triggers.is_empty() => {
                                info!("Claimed {} pending triggers", triggers.len());
                                for (message_id, trigger) in triggers {
                                    Self::handle(&queue, &dispatcher, message_id, trigger);
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending triggers: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn consume_triggers(&self) -> WorkerResult<()> {
        let available = self.dispatcher.capacity();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let block_ms = u64::try_from(self.config.consume_block.as_millis()).unwrap_or(1000);
        let triggers = self
            .queue
            .consume(&self.consumer_name, block_ms, available.min(self.config.consume_batch))
            .await?;

        if !triggers.is_empty() {
            debug!("Consumed {} triggers", triggers.len());
        }
        for (message_id, trigger) in triggers {
            Self::handle(&self.queue, &self.dispatcher, message_id, trigger);
        }

        Ok(())
    }

    /// Dispatch one trigger and settle its stream message when the
    /// instance ends.
    fn handle(
        queue: &Arc<JobQueue>,
        dispatcher: &Arc<Dispatcher>,
        message_id: String,
        trigger: ProcessJobTrigger,
    ) {
        let handle = match dispatcher.dispatch(trigger.clone()) {
            Submission::Started { handle, .. } => handle,
            Submission::Duplicate { job_id } => {
                // The running instance settles its own message.
                debug!("Job {} already running, leaving message {} pending", job_id, message_id);
                return;
            }
        };

        let queue = Arc::clone(queue);
        tokio::spawn(async move {
            let result = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("instance task failed: {}", e)),
            };

            match result {
                Ok(outcome) => {
                    info!(
                        "Instance {} finished ({}), acking {}",
                        trigger.instance,
                        if outcome.is_completed() { "completed" } else { "failed" },
                        message_id
                    );
                    if let Err(e) = queue.ack(&message_id).await {
                        error!("Failed to ack trigger {}: {}", message_id, e);
                    }
                    if let Err(e) = queue.clear_dedup(&trigger).await {
                        warn!("Failed to clear dedup key for job {}: {}", trigger.job_id, e);
                    }
                }
                Err(e) => {
                    error!("Instance {} did not finish: {}", trigger.instance, e);

                    let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                    let max_retries = queue.max_retries();
                    if retry_count >= max_retries {
                        warn!(
                            "Trigger for job {} exceeded max retries ({}), moving to DLQ",
                            trigger.job_id, max_retries
                        );
                        if let Err(dlq_err) = queue.dlq(&message_id, &trigger, &e).await {
                            error!("Failed to move trigger {} to DLQ: {}", message_id, dlq_err);
                        }
                    } else {
                        info!(
                            "Trigger for job {} will be redelivered (attempt {}/{})",
                            trigger.job_id, retry_count, max_retries
                        );
                    }
                }
            }
        });
    }

    async fn wait_for_instances(&self) {
        while self.dispatcher.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
