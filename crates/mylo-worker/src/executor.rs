//! Step executor: runs workflow instances with memoized steps and
//! whole-instance retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use mylo_models::InstanceKey;
use mylo_store::{InstanceOutcome, StepJournal};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::step::StepContext;

/// A sequence of named steps with a failure handler.
#[async_trait]
pub trait Workflow: Send + Sync {
    type Input: Send + Sync;
    type Output: Serialize + DeserializeOwned + Send;

    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Run the steps. Every side effect must go through `ctx`.
    async fn run(&self, ctx: &mut StepContext, input: &Self::Input) -> WorkerResult<Self::Output>;

    /// Called once, after the final failed attempt. Errors are logged by
    /// the executor and never propagated.
    async fn on_failure(&self, input: &Self::Input, error: &WorkerError) -> WorkerResult<()>;
}

/// Whole-instance retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub base_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Policy without delays between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts).with_base_delay(Duration::ZERO)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Final result of a workflow instance.
#[derive(Debug)]
pub enum RunOutcome<T> {
    Completed { output: T, attempts: u32 },
    Failed { error: String, attempts: u32 },
}

impl<T> RunOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RunOutcome::Completed { attempts, .. } | RunOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn output(&self) -> Option<&T> {
        match self {
            RunOutcome::Completed { output, .. } => Some(output),
            RunOutcome::Failed { .. } => None,
        }
    }
}

/// Executes workflow instances against a step journal.
#[derive(Clone)]
pub struct StepExecutor {
    journal: Arc<dyn StepJournal>,
    policy: RetryPolicy,
}

impl StepExecutor {
    pub fn new(journal: Arc<dyn StepJournal>, policy: RetryPolicy) -> Self {
        Self { journal, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn journal(&self) -> &Arc<dyn StepJournal> {
        &self.journal
    }

    /// Run an instance to its terminal outcome.
    ///
    /// An instance with a recorded outcome returns it without running any
    /// step or handler. Steps recorded by an earlier, interrupted run are
    /// replayed. The outer `Err` is reserved for journal failures that
    /// leave the instance unfinished.
    pub async fn execute<W: Workflow>(
        &self,
        workflow: &W,
        instance: &InstanceKey,
        input: &W::Input,
    ) -> WorkerResult<RunOutcome<W::Output>> {
        if let Some(outcome) = self.journal.load_outcome(instance).await? {
            info!(instance = %instance, workflow = workflow.name(), "Instance already finished");
            return Self::replay_outcome(outcome);
        }

        let mut attempt = 1;
        loop {
            let mut ctx = StepContext::new(instance.clone(), Arc::clone(&self.journal), attempt);

            match workflow.run(&mut ctx, input).await {
                Ok(output) => {
                    let recorded = serde_json::to_value(&output)?;
                    self.journal
                        .record_outcome(instance, InstanceOutcome::completed(recorded, attempt))
                        .await?;
                    metrics::record_instance(workflow.name(), "completed");
                    info!(instance = %instance, workflow = workflow.name(), attempt, "Instance completed");
                    return Ok(RunOutcome::Completed {
                        output,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        instance = %instance,
                        workflow = workflow.name(),
                        attempt,
                        "Attempt failed, retrying in {:?}: {}", delay, e
                    );
                    metrics::record_instance_retry(workflow.name());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(instance = %instance, workflow = workflow.name(), attempt, "Instance failed: {}", e);

                    if let Err(handler_err) = workflow.on_failure(input, &e).await {
                        error!(
                            instance = %instance,
                            workflow = workflow.name(),
                            "Failure handler failed: {}", handler_err
                        );
                    }

                    let message = e.to_string();
                    self.journal
                        .record_outcome(instance, InstanceOutcome::failed(message.clone(), attempt))
                        .await?;
                    metrics::record_instance(workflow.name(), "failed");
                    return Ok(RunOutcome::Failed {
                        error: message,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn replay_outcome<T: DeserializeOwned>(outcome: InstanceOutcome) -> WorkerResult<RunOutcome<T>> {
        match outcome {
            InstanceOutcome::Completed { output, attempts, .. } => Ok(RunOutcome::Completed {
                output: serde_json::from_value(output)
                    .map_err(|e| WorkerError::Replay(format!("instance output: {}", e)))?,
                attempts,
            }),
            InstanceOutcome::Failed { error, attempts, .. } => Ok(RunOutcome::Failed { error, attempts }),
        }
    }
}
