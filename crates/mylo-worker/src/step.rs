//! Memoized step execution.
//!
//! A [`StepContext`] is handed to a workflow for one attempt of one
//! instance. Every side effect goes through [`StepContext::run`]: a step
//! already in the journal returns its recorded output, anything else runs
//! and is recorded before its output is returned.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use mylo_models::InstanceKey;
use mylo_store::{StepJournal, StepRecord};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Per-attempt execution context of one workflow instance.
pub struct StepContext {
    instance: InstanceKey,
    journal: Arc<dyn StepJournal>,
    attempt: u32,
    seen: HashSet<String>,
    executed: Vec<String>,
}

impl StepContext {
    pub fn new(instance: InstanceKey, journal: Arc<dyn StepJournal>, attempt: u32) -> Self {
        Self {
            instance,
            journal,
            attempt,
            seen: HashSet::new(),
            executed: Vec::new(),
        }
    }

    pub fn instance(&self) -> &InstanceKey {
        &self.instance
    }

    /// Attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Steps that actually ran (not replayed) in this attempt, in order.
    pub fn executed_steps(&self) -> &[String] {
        &self.executed
    }

    /// Run a named step once per instance.
    ///
    /// `op` is only polled when the journal has no record for `name`.
    pub async fn run<T, Fut>(&mut self, name: &str, op: Fut) -> WorkerResult<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = WorkerResult<T>>,
    {
        self.run_step(name, None, op).await
    }

    /// Like [`run`](Self::run), also journaling the input the step ran with.
    pub async fn run_with_input<I, T, Fut>(&mut self, name: &str, input: &I, op: Fut) -> WorkerResult<T>
    where
        I: Serialize,
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = WorkerResult<T>>,
    {
        let input = serde_json::to_value(input)?;
        self.run_step(name, Some(input), op).await
    }

    async fn run_step<T, Fut>(&mut self, name: &str, input: Option<Value>, op: Fut) -> WorkerResult<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = WorkerResult<T>>,
    {
        if !self.seen.insert(name.to_string()) {
            return Err(WorkerError::DuplicateStep(name.to_string()));
        }

        if let Some(record) = self.journal.load_step(&self.instance, name).await? {
            debug!(instance = %self.instance, step = name, "Replaying journaled step");
            metrics::record_step(name, "replayed", 0.0);
            return serde_json::from_value(record.output)
                .map_err(|e| WorkerError::Replay(format!("{}: {}", name, e)));
        }

        let start = Instant::now();
        let output = match op.await {
            Ok(output) => output,
            Err(e) => {
                warn!(instance = %self.instance, step = name, attempt = self.attempt, "Step failed: {}", e);
                metrics::record_step(name, "failed", start.elapsed().as_secs_f64());
                return Err(e);
            }
        };
        metrics::record_step(name, "executed", start.elapsed().as_secs_f64());

        let record = StepRecord::new(name, input, serde_json::to_value(&output)?, self.attempt);
        self.journal.record_step(&self.instance, record).await?;
        self.executed.push(name.to_string());

        debug!(instance = %self.instance, step = name, "Step completed");
        Ok(output)
    }
}
