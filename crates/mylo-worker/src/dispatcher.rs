//! Trigger API: starts and resumes workflow instances.
//!
//! Every instance passes two gates before its first step: the per-owner
//! [`ConcurrencyGate`] (one instance per owner, FIFO) and a global
//! semaphore bounding instances across all owners.
//!
//! An instance with nothing journaled yet is a fresh run. Once admitted,
//! a fresh run first resets a `failed` or `no credits` job to `queued`,
//! whichever path (API or stream) delivered it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, Instrument};

use mylo_models::{InstanceKey, JobId, JobStatus, OwnerId, ProcessJobTrigger};
use mylo_store::{JobUpdate, RecordStore, StepJournal};

use crate::error::{WorkerError, WorkerResult};
use crate::executor::{RunOutcome, StepExecutor};
use crate::gate::ConcurrencyGate;
use crate::logging::JobLogger;
use crate::metrics;
use crate::workflow::{ProcessJobOutput, ProcessJobWorkflow};

/// Handle to a running instance.
pub type InstanceHandle = JoinHandle<WorkerResult<RunOutcome<ProcessJobOutput>>>;

/// Result of submitting a trigger.
#[derive(Debug)]
pub enum Submission {
    Started {
        instance: InstanceKey,
        handle: InstanceHandle,
    },
    /// The job is already running or already processed; nothing started.
    Duplicate { job_id: JobId },
}

impl Submission {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Submission::Duplicate { .. })
    }

    /// Wait for a started instance. Duplicates resolve to `None`.
    pub async fn wait(self) -> WorkerResult<Option<RunOutcome<ProcessJobOutput>>> {
        match self {
            Submission::Started { handle, .. } => handle
                .await
                .map_err(|e| WorkerError::config_error(format!("instance task panicked: {}", e)))?
                .map(Some),
            Submission::Duplicate { .. } => Ok(None),
        }
    }
}

/// Removes a job from the in-flight set when its task ends.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<JobId>>>,
    job_id: JobId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.remove(&self.job_id);
        metrics::set_active_instances(in_flight.len());
    }
}

pub struct Dispatcher {
    executor: Arc<StepExecutor>,
    workflow: Arc<ProcessJobWorkflow>,
    store: Arc<dyn RecordStore>,
    gate: ConcurrencyGate,
    slots: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    in_flight: Arc<Mutex<HashSet<JobId>>>,
}

impl Dispatcher {
    pub fn new(
        executor: StepExecutor,
        workflow: ProcessJobWorkflow,
        max_concurrent_jobs: usize,
    ) -> Self {
        let store = Arc::clone(workflow.store());
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        Self {
            executor: Arc::new(executor),
            workflow: Arc::new(workflow),
            store,
            gate: ConcurrencyGate::new(),
            slots: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Free global slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Instances that can still be accepted. Instances parked on the
    /// per-owner gate count against the limit as well as running ones.
    pub fn capacity(&self) -> usize {
        self.max_concurrent_jobs.saturating_sub(self.in_flight())
    }

    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Submit a job for processing with a fresh instance.
    ///
    /// A job that is running here, `processing` or `processed` is a
    /// duplicate. A `failed` or `no credits` job is reset to `queued`
    /// once the instance is admitted. An unknown job still starts an
    /// instance, which ends in its first step without writing any status.
    pub async fn submit(&self, job_id: JobId, owner_id: OwnerId) -> WorkerResult<Submission> {
        if self.lock_in_flight().contains(&job_id) {
            metrics::record_trigger("submit", "duplicate");
            return Ok(Submission::Duplicate { job_id });
        }

        if let Some(job) = self.store.get_job(&job_id).await? {
            if matches!(job.status, JobStatus::Processing | JobStatus::Processed) {
                info!(job_id = %job_id, status = %job.status, "Ignoring duplicate submission");
                metrics::record_trigger("submit", "duplicate");
                return Ok(Submission::Duplicate { job_id });
            }
        }

        let trigger = ProcessJobTrigger::new(job_id, owner_id);
        Ok(self.start(trigger, "submit"))
    }

    /// Run a trigger delivered by the transport. Its instance key is kept,
    /// so a redelivered trigger resumes from the journal while a new
    /// trigger for a failed job starts over.
    pub fn dispatch(&self, trigger: ProcessJobTrigger) -> Submission {
        self.start(trigger, "stream")
    }

    fn start(&self, trigger: ProcessJobTrigger, source: &'static str) -> Submission {
        {
            let mut in_flight = self.lock_in_flight();
            if !in_flight.insert(trigger.job_id.clone()) {
                metrics::record_trigger(source, "duplicate");
                return Submission::Duplicate {
                    job_id: trigger.job_id,
                };
            }
            metrics::set_active_instances(in_flight.len());
        }
        metrics::record_trigger(source, "started");

        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            job_id: trigger.job_id.clone(),
        };
        let ticket = self.gate.enqueue(trigger.owner_id.as_str());
        let slots = Arc::clone(&self.slots);
        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let workflow = Arc::clone(&self.workflow);
        let instance = trigger.instance.clone();
        let span = JobLogger::new(&instance, "process_job").create_span();

        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                let queued_at = Instant::now();

                let _permit = ticket.admitted().await?;
                let _slot = slots
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkerError::GateClosed("global slots".into()))?;
                metrics::record_gate_wait(queued_at.elapsed().as_secs_f64());

                requeue_if_fresh(store.as_ref(), executor.journal().as_ref(), &trigger).await?;
                executor
                    .execute(workflow.as_ref(), &trigger.instance, &trigger)
                    .await
            }
            .instrument(span),
        );

        Submission::Started { instance, handle }
    }
}

/// Reset a `failed` or `no credits` job to `queued` when the instance has
/// not journaled anything yet. Resumed instances are left alone.
async fn requeue_if_fresh(
    store: &dyn RecordStore,
    journal: &dyn StepJournal,
    trigger: &ProcessJobTrigger,
) -> WorkerResult<()> {
    if journal.load_outcome(&trigger.instance).await?.is_some()
        || !journal.steps(&trigger.instance).await?.is_empty()
    {
        return Ok(());
    }

    match store.get_job(&trigger.job_id).await? {
        Some(job) if job.status.can_requeue() => {
            store
                .update_job(&trigger.job_id, JobUpdate::status(JobStatus::Queued))
                .await?;
            info!(job_id = %trigger.job_id, from = %job.status, "Job requeued");
            Ok(())
        }
        _ => Ok(()),
    }
}
