//! Step journal: durable memo of completed workflow steps.
//!
//! The executor consults the journal before running a step. A recorded
//! step is replayed from its stored output instead of being re-run, which
//! makes an instance resumable from its last completed step.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mylo_models::InstanceKey;

use crate::error::{StoreError, StoreResult};

/// Completed step of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name, unique within the instance
    pub name: String,
    /// Input the step ran with, when the step declared one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Serialized step output
    pub output: Value,
    /// Attempt number that produced the record (1-based)
    pub attempt: u32,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(name: impl Into<String>, input: Option<Value>, output: Value, attempt: u32) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            attempt,
            completed_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceOutcome {
    Completed {
        output: Value,
        attempts: u32,
        finished_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        attempts: u32,
        finished_at: DateTime<Utc>,
    },
}

impl InstanceOutcome {
    pub fn completed(output: Value, attempts: u32) -> Self {
        Self::Completed {
            output,
            attempts,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>, attempts: u32) -> Self {
        Self::Failed {
            error: error.into(),
            attempts,
            finished_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, InstanceOutcome::Completed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            InstanceOutcome::Completed { attempts, .. } | InstanceOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Durable storage for step records and instance outcomes.
#[async_trait]
pub trait StepJournal: Send + Sync {
    async fn load_step(&self, instance: &InstanceKey, step: &str) -> StoreResult<Option<StepRecord>>;

    /// Record a completed step. The first record for a name wins; later
    /// writes for the same name are ignored.
    async fn record_step(&self, instance: &InstanceKey, record: StepRecord) -> StoreResult<()>;

    /// All recorded steps of an instance in completion order.
    async fn steps(&self, instance: &InstanceKey) -> StoreResult<Vec<StepRecord>>;

    async fn load_outcome(&self, instance: &InstanceKey) -> StoreResult<Option<InstanceOutcome>>;

    async fn record_outcome(&self, instance: &InstanceKey, outcome: InstanceOutcome) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct JournalEntry {
    steps: Vec<StepRecord>,
    outcome: Option<InstanceOutcome>,
}

/// Step journal held in process memory. Survives executor restarts
/// within one process, which is what the tests simulate.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<HashMap<InstanceKey, JournalEntry>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<InstanceKey, JournalEntry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::ConnectionFailed("journal mutex poisoned".into()))
    }
}

#[async_trait]
impl StepJournal for MemoryJournal {
    async fn load_step(&self, instance: &InstanceKey, step: &str) -> StoreResult<Option<StepRecord>> {
        Ok(self
            .lock()?
            .get(instance)
            .and_then(|entry| entry.steps.iter().find(|r| r.name == step).cloned()))
    }

    async fn record_step(&self, instance: &InstanceKey, record: StepRecord) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let entry = entries.entry(instance.clone()).or_default();
        if !entry.steps.iter().any(|r| r.name == record.name) {
            entry.steps.push(record);
        }
        Ok(())
    }

    async fn steps(&self, instance: &InstanceKey) -> StoreResult<Vec<StepRecord>> {
        Ok(self
            .lock()?
            .get(instance)
            .map(|entry| entry.steps.clone())
            .unwrap_or_default())
    }

    async fn load_outcome(&self, instance: &InstanceKey) -> StoreResult<Option<InstanceOutcome>> {
        Ok(self.lock()?.get(instance).and_then(|entry| entry.outcome.clone()))
    }

    async fn record_outcome(&self, instance: &InstanceKey, outcome: InstanceOutcome) -> StoreResult<()> {
        self.lock()?.entry(instance.clone()).or_default().outcome = Some(outcome);
        Ok(())
    }
}
