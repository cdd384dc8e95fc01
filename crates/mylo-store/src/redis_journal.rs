//! Redis-backed step journal.
//!
//! Each instance owns three keys:
//! - `{prefix}:journal:{instance}`: hash of step name to JSON record
//! - `{prefix}:journal:{instance}:order`: step names in completion order
//! - `{prefix}:journal:{instance}:outcome`: JSON terminal outcome

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use mylo_models::InstanceKey;

use crate::error::StoreResult;
use crate::journal::{InstanceOutcome, StepJournal, StepRecord};
use crate::redis_store::RedisStoreConfig;

/// Record a step once, append it to the completion order and refresh both
/// TTLs. Returns 0 when the step was already journaled.
const RECORD_STEP_SCRIPT: &str = r#"
local created = redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2])
if created == 1 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
end
redis.call('EXPIRE', KEYS[1], ARGV[3])
redis.call('EXPIRE', KEYS[2], ARGV[3])
return created
"#;

/// Step journal client.
pub struct RedisStepJournal {
    client: redis::Client,
    config: RedisStoreConfig,
}

impl RedisStepJournal {
    pub fn new(config: RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(RedisStoreConfig::from_env())
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn steps_key(&self, instance: &InstanceKey) -> String {
        format!("{}:journal:{}", self.config.key_prefix, instance)
    }

    fn order_key(&self, instance: &InstanceKey) -> String {
        format!("{}:order", self.steps_key(instance))
    }

    fn outcome_key(&self, instance: &InstanceKey) -> String {
        format!("{}:outcome", self.steps_key(instance))
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.config.journal_ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl StepJournal for RedisStepJournal {
    async fn load_step(&self, instance: &InstanceKey, step: &str) -> StoreResult<Option<StepRecord>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.hget(self.steps_key(instance), step).await?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }

    async fn record_step(&self, instance: &InstanceKey, record: StepRecord) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let steps_key = self.steps_key(instance);
        let order_key = self.order_key(instance);
        let payload = serde_json::to_string(&record)?;

        let created: i64 = redis::Script::new(RECORD_STEP_SCRIPT)
            .key(&steps_key)
            .key(&order_key)
            .arg(&record.name)
            .arg(payload)
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            debug!("Step {} of {} already journaled", record.name, instance);
            return Ok(());
        }

        debug!("Journaled step {} of {}", record.name, instance);
        Ok(())
    }

    async fn steps(&self, instance: &InstanceKey) -> StoreResult<Vec<StepRecord>> {
        let mut conn = self.connection().await?;
        let names: Vec<String> = conn.lrange(self.order_key(instance), 0, -1).await?;

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let payload: Option<String> = conn.hget(self.steps_key(instance), &name).await?;
            if let Some(payload) = payload {
                records.push(serde_json::from_str(&payload)?);
            }
        }
        Ok(records)
    }

    async fn load_outcome(&self, instance: &InstanceKey) -> StoreResult<Option<InstanceOutcome>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(self.outcome_key(instance)).await?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }

    async fn record_outcome(&self, instance: &InstanceKey, outcome: InstanceOutcome) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&outcome)?;
        conn.set_ex::<_, _, ()>(self.outcome_key(instance), payload, self.config.journal_ttl.as_secs())
            .await?;
        Ok(())
    }
}
