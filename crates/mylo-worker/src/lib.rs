//! Durable clip-processing workflow engine.
//!
//! This crate provides:
//! - Step journal replay (`StepContext`) and whole-instance retry (`StepExecutor`)
//! - Per-owner FIFO concurrency gate
//! - The process-job workflow and the synchronous clip edit flow
//! - Trigger dispatch and the Redis stream consumer
//! - Graceful shutdown

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod edit;
pub mod error;
pub mod executor;
pub mod gate;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod step;
pub mod workflow;

pub use config::WorkerConfig;
pub use consumer::TriggerConsumer;
pub use dispatcher::{Dispatcher, InstanceHandle, Submission};
pub use edit::{ClipEditor, EDIT_COST};
pub use error::{WorkerError, WorkerResult};
pub use executor::{RetryPolicy, RunOutcome, StepExecutor, Workflow};
pub use gate::{ConcurrencyGate, GatePermit, GateTicket};
pub use ingest::{parse_ingest, IngestPlan};
pub use logging::JobLogger;
pub use step::StepContext;
pub use workflow::{CreditCheck, ProcessJobOutput, ProcessJobWorkflow};
