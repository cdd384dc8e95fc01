//! Redis-backed record store.
//!
//! Layout:
//! - `{prefix}:job:{id}`: hash with the job record fields
//! - `{prefix}:credits:{owner}`: integer balance
//! - `{prefix}:clip:{id}`: JSON clip artifact
//! - `{prefix}:job_clips:{job}`: list of clip IDs in insertion order

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::{debug, info};

use mylo_models::{ClipArtifact, ClipId, JobId, JobRecord, JobStatus, OwnerId};

use crate::error::{StoreError, StoreResult};
use crate::records::{BalanceChange, JobUpdate, RecordStore};

/// Remove `min(balance, by)` credits. Returns the balance before the
/// decrement, or -1 when the owner has no balance key.
const DECREMENT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local before = tonumber(current)
local by = tonumber(ARGV[1])
local deducted = math.min(before, by)
if deducted > 0 then
    redis.call('DECRBY', KEYS[1], deducted)
end
return before
"#;

/// Add credits to an existing balance. Returns the new balance, or -1 when
/// the owner has no balance key.
const INCREMENT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
return redis.call('INCRBY', KEYS[1], ARGV[1])
"#;

/// Store a clip and append it to its job's list in one step. Returns 0 when
/// the clip key already exists.
const CREATE_CLIP_SCRIPT: &str = r#"
if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    return 0
end
redis.call('RPUSH', KEYS[2], ARGV[2])
return 1
"#;

/// Set hash fields only when the hash exists. Returns 0 for a missing key.
const UPDATE_IF_EXISTS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key written by the store and journal
    pub key_prefix: String,
    /// How long journal entries are retained after the last write
    pub journal_ttl: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "mylo".to_string(),
            journal_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl RedisStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "mylo".to_string()),
            journal_ttl: Duration::from_secs(
                std::env::var("JOURNAL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(7 * 24 * 3600),
            ),
        }
    }
}

/// Record store client.
pub struct RedisRecordStore {
    client: redis::Client,
    config: RedisStoreConfig,
}

impl RedisRecordStore {
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

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    fn credits_key(&self, owner: &OwnerId) -> String {
        format!("{}:credits:{}", self.config.key_prefix, owner)
    }

    fn clip_key(&self, id: &ClipId) -> String {
        format!("{}:clip:{}", self.config.key_prefix, id)
    }

    fn job_clips_key(&self, job: &JobId) -> String {
        format!("{}:job_clips:{}", self.config.key_prefix, job)
    }
}

fn job_fields(job: &JobRecord) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("id", job.id.to_string()),
        ("owner_id", job.owner_id.to_string()),
        ("source_key", job.source_key.clone()),
        ("uploaded", job.uploaded.to_string()),
        ("status", job.status.as_str().to_string()),
        ("created_at", job.created_at.to_rfc3339()),
        ("updated_at", job.updated_at.to_rfc3339()),
    ];
    if let Some(name) = &job.display_name {
        fields.push(("display_name", name.clone()));
    }
    fields
}

fn parse_time(fields: &HashMap<String, String>, name: &str) -> StoreResult<DateTime<Utc>> {
    let raw = fields
        .get(name)
        .ok_or_else(|| StoreError::corrupt(format!("job hash missing {}", name)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("bad {}: {}", name, e)))
}

fn job_from_fields(fields: HashMap<String, String>) -> StoreResult<JobRecord> {
    let required = |name: &str| {
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::corrupt(format!("job hash missing {}", name)))
    };

    Ok(JobRecord {
        id: JobId::from_string(required("id")?),
        owner_id: OwnerId::from_string(required("owner_id")?),
        source_key: required("source_key")?,
        display_name: fields.get("display_name").cloned(),
        uploaded: fields.get("uploaded").map(|v| v == "true").unwrap_or(false),
        status: JobStatus::from_stored(fields.get("status").map(String::as_str))
            .map_err(|e| StoreError::corrupt(e.to_string()))?,
        created_at: parse_time(&fields, "created_at")?,
        updated_at: parse_time(&fields, "updated_at")?,
    })
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn insert_job(&self, job: JobRecord) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = self.job_key(&job.id);

        let created: bool = conn.hset_nx(&key, "id", job.id.as_str()).await?;
        if !created {
            return Err(StoreError::AlreadyExists(format!("job {}", job.id)));
        }
        conn.hset_multiple::<_, _, _, ()>(&key, &job_fields(&job)).await?;

        info!("Inserted job {} for owner {}", job.id, job.owner_id);
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<JobRecord>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        job_from_fields(fields).map(Some)
    }

    async fn update_job(&self, id: &JobId, update: JobUpdate) -> StoreResult<()> {
        let mut args: Vec<String> = vec!["updated_at".into(), Utc::now().to_rfc3339()];
        if let Some(status) = update.status {
            args.push("status".into());
            args.push(status.as_str().into());
        }
        if let Some(uploaded) = update.uploaded {
            args.push("uploaded".into());
            args.push(uploaded.to_string());
        }
        if let Some(source_key) = update.source_key {
            args.push("source_key".into());
            args.push(source_key);
        }

        let mut conn = self.connection().await?;
        let updated: i64 = redis::Script::new(UPDATE_IF_EXISTS_SCRIPT)
            .key(self.job_key(id))
            .arg(args)
            .invoke_async(&mut conn)
            .await?;

        if updated == 0 {
            return Err(StoreError::not_found(format!("job {}", id)));
        }
        debug!("Updated job {}", id);
        Ok(())
    }

    async fn get_balance(&self, owner: &OwnerId) -> StoreResult<u32> {
        let mut conn = self.connection().await?;
        let balance: Option<u32> = conn.get(self.credits_key(owner)).await?;
        balance.ok_or_else(|| StoreError::not_found(format!("owner {}", owner)))
    }

    async fn set_balance(&self, owner: &OwnerId, credits: u32) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.credits_key(owner), credits).await?;
        Ok(())
    }

    async fn decrement_balance(&self, owner: &OwnerId, by: u32) -> StoreResult<BalanceChange> {
        let mut conn = self.connection().await?;
        let before: i64 = redis::Script::new(DECREMENT_SCRIPT)
            .key(self.credits_key(owner))
            .arg(by)
            .invoke_async(&mut conn)
            .await?;

        if before < 0 {
            return Err(StoreError::not_found(format!("owner {}", owner)));
        }
        let before = u32::try_from(before)
            .map_err(|_| StoreError::corrupt(format!("balance out of range for {}", owner)))?;

        let change = BalanceChange::capped(before, by);
        debug!(
            "Decremented balance of {} by {} ({} -> {})",
            owner, change.deducted, change.before, change.after
        );
        Ok(change)
    }

    async fn increment_balance(&self, owner: &OwnerId, by: u32) -> StoreResult<u32> {
        let mut conn = self.connection().await?;
        let after: i64 = redis::Script::new(INCREMENT_SCRIPT)
            .key(self.credits_key(owner))
            .arg(by)
            .invoke_async(&mut conn)
            .await?;

        if after < 0 {
            return Err(StoreError::not_found(format!("owner {}", owner)));
        }
        let after = u32::try_from(after)
            .map_err(|_| StoreError::corrupt(format!("balance out of range for {}", owner)))?;
        debug!("Returned {} credits to {} (now {})", by, owner, after);
        Ok(after)
    }

    async fn create_artifacts(&self, clips: Vec<ClipArtifact>) -> StoreResult<usize> {
        let mut conn = self.connection().await?;
        let script = redis::Script::new(CREATE_CLIP_SCRIPT);
        let mut inserted = 0;

        for clip in clips {
            let payload = serde_json::to_string(&clip)?;
            let created: i64 = script
                .key(self.clip_key(&clip.id))
                .key(self.job_clips_key(&clip.job_id))
                .arg(payload)
                .arg(clip.id.as_str())
                .invoke_async(&mut conn)
                .await?;
            if created == 1 {
                inserted += 1;
            } else {
                debug!("Clip {} already exists, skipping", clip.id);
            }
        }

        Ok(inserted)
    }

    async fn get_artifact(&self, id: &ClipId) -> StoreResult<Option<ClipArtifact>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(self.clip_key(id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn list_artifacts(&self, job: &JobId) -> StoreResult<Vec<ClipArtifact>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.lrange(self.job_clips_key(job), 0, -1).await?;

        let mut clips = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn.get(self.clip_key(&ClipId::from_string(id))).await?;
            if let Some(payload) = payload {
                clips.push(serde_json::from_str(&payload)?);
            }
        }
        Ok(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisRecordStore {
        let config = RedisStoreConfig {
            key_prefix: format!("mylo-test-{}", unique_suffix()),
            ..RedisStoreConfig::from_env()
        };
        RedisRecordStore::new(config).unwrap()
    }

    fn unique_suffix() -> String {
        Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
    }

    #[test]
    fn test_job_fields_roundtrip() {
        let job = JobRecord::new("owner-1", "abc/original").with_display_name("My video");
        let fields: HashMap<String, String> = job_fields(&job)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = job_from_fields(fields).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.display_name.as_deref(), Some("My video"));
        assert_eq!(parsed.status, JobStatus::Queued);
    }

    #[test]
    fn test_missing_field_is_corrupt() {
        let err = job_from_fields(HashMap::new()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_decrement_is_capped() {
        let store = store();
        let owner = OwnerId::from("owner-1");
        store.set_balance(&owner, 2).await.unwrap();

        let change = store.decrement_balance(&owner, 5).await.unwrap();
        assert_eq!(change, BalanceChange { before: 2, deducted: 2, after: 0 });
        assert_eq!(store.get_balance(&owner).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_replayed_create_lists_clip_once() {
        let store = store();
        let job = JobId::from("job-1");
        let clip = ClipArtifact::new(job.clone(), OwnerId::from("owner-1"), "abc/clip_0");

        assert_eq!(store.create_artifacts(vec![clip.clone()]).await.unwrap(), 1);
        assert_eq!(store.create_artifacts(vec![clip.clone()]).await.unwrap(), 0);

        let listed = store.list_artifacts(&job).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, clip.id);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_increment_missing_owner() {
        let store = store();
        let owner = OwnerId::from("owner-1");
        assert!(store.increment_balance(&owner, 1).await.unwrap_err().is_not_found());

        store.set_balance(&owner, 0).await.unwrap();
        assert_eq!(store.increment_balance(&owner, 2).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_update_missing_job() {
        let store = store();
        let err = store
            .update_job(&JobId::from("missing"), JobUpdate::status(JobStatus::Processing))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
