//! Clip-processing worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mylo_media::{CloudinaryLibrary, ProcessingClient};
use mylo_queue::JobQueue;
use mylo_store::{RedisRecordStore, RedisStepJournal, RedisStoreConfig};
use mylo_worker::{
    metrics::init_metrics, Dispatcher, ProcessJobWorkflow, StepExecutor, TriggerConsumer,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("mylo=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting mylo-worker");

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|p| p.parse().ok()) {
        if let Err(e) = init_metrics(port) {
            warn!("Metrics exporter disabled: {}", e);
        }
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store_config = RedisStoreConfig::from_env();
    let store = RedisRecordStore::new(store_config.clone()).context("record store")?;
    let journal = RedisStepJournal::new(store_config).context("step journal")?;
    let processing = ProcessingClient::from_env().context("processing client")?;
    let library = CloudinaryLibrary::from_env().context("media library")?;
    let queue = JobQueue::from_env().context("job queue")?;

    let executor = StepExecutor::new(Arc::new(journal), config.retry_policy());
    let workflow = ProcessJobWorkflow::new(Arc::new(store), processing, Arc::new(library));
    let dispatcher = Dispatcher::new(executor, workflow, config.max_concurrent_jobs);
    let consumer = Arc::new(TriggerConsumer::new(config, queue, dispatcher));

    let signal_consumer = Arc::clone(&consumer);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_consumer.shutdown();
    });

    if let Err(e) = consumer.run().await {
        error!("Consumer error: {}", e);
        return Err(e.into());
    }

    info!("Worker shutdown complete");
    Ok(())
}
