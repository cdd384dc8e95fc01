//! Worker configuration.

use std::time::Duration;

use crate::executor::RetryPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum workflow instances running at once, across all owners
    pub max_concurrent_jobs: usize,
    /// Whole-instance attempts before the failure handler runs
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further attempt
    pub retry_base_delay: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How long one consume call blocks waiting for triggers
    pub consume_block: Duration,
    /// Maximum triggers taken from the stream per consume call
    pub consume_batch: usize,
    /// How often the worker scans for orphaned pending triggers
    pub claim_interval: Duration,
    /// Minimum idle time before a pending trigger can be claimed (crash recovery).
    /// Must exceed the processing timeout so a live run is never claimed.
    pub claim_min_idle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_attempts: 2,
            retry_base_delay: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(60),
            consume_block: Duration::from_millis(1000),
            consume_batch: 5,
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(1800), // 2x processing timeout
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS").unwrap_or(defaults.max_concurrent_jobs),
            max_attempts: env_parse("WORKER_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            retry_base_delay: env_parse("WORKER_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            consume_block: env_parse("WORKER_CONSUME_BLOCK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.consume_block),
            consume_batch: env_parse("WORKER_CONSUME_BATCH").unwrap_or(defaults.consume_batch),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
        }
    }

    /// Retry policy for workflow instances.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts).with_base_delay(self.retry_base_delay)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_retry_once() {
        let config = WorkerConfig::default();
        assert_eq!(config.retry_policy().max_attempts, 2);
        assert!(config.claim_min_idle > Duration::from_secs(900));
    }
}
