//! Configuration for the offset store manager.
//!
//! ```rust,no_run
//! use mqtt_offset_store::store::OffsetStoreConfig;
//!
//! // Defaults, overridable through OFFSET_* environment variables
//! let config = OffsetStoreConfig::from_env().expect("valid offset store config");
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::constants::{
    DEFAULT_FETCH_BARRIER_TIMEOUT_MS, DEFAULT_PER_CALL_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_DRAIN_TIMEOUT_MS, DEFAULT_WORKER_POOL_SIZE,
};

use super::error::{OffsetStoreError, OffsetStoreResult};

/// Retry behavior for failed commit calls.
///
/// Commits are fire-and-forget and a lost checkpoint only causes
/// redelivery, so retrying is off unless a deployment opts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitRetry {
    /// Each commit is attempted exactly once.
    #[default]
    Disabled,
    /// Retry retriable failures with jittered exponential backoff.
    Exponential {
        /// Retries after the first attempt.
        max_retries: usize,
        /// Delay before the first retry.
        min_delay: Duration,
        /// Cap on the delay between retries.
        max_delay: Duration,
    },
}

impl CommitRetry {
    /// Exponential retry with the store's standard delays.
    pub fn exponential(max_retries: usize) -> Self {
        CommitRetry::Exponential {
            max_retries,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, CommitRetry::Disabled)
    }
}

/// Configuration for an [`OffsetStoreManager`](super::OffsetStoreManager).
#[derive(Debug, Clone)]
pub struct OffsetStoreConfig {
    /// Maximum number of remote calls running at once.
    ///
    /// Further calls wait for a free slot; they are never dropped.
    pub worker_pool_size: usize,

    /// Upper bound for a single commit or query call.
    pub per_call_timeout: Duration,

    /// Upper bound for a whole fetch fan-in. Queues still pending when it
    /// elapses report the sentinel offset.
    pub fetch_barrier_timeout: Duration,

    /// Retry policy for commit calls.
    pub commit_retry: CommitRetry,

    /// How long `shutdown` waits for in-flight calls before cancelling them.
    pub shutdown_drain_timeout: Duration,
}

impl Default for OffsetStoreConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            per_call_timeout: Duration::from_millis(DEFAULT_PER_CALL_TIMEOUT_MS),
            fetch_barrier_timeout: Duration::from_millis(DEFAULT_FETCH_BARRIER_TIMEOUT_MS),
            commit_retry: CommitRetry::Disabled,
            shutdown_drain_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_DRAIN_TIMEOUT_MS),
        }
    }
}

impl OffsetStoreConfig {
    /// Validate the configuration and return any errors found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.worker_pool_size == 0 {
            errors.push("worker_pool_size must be at least 1".to_string());
        }

        if self.per_call_timeout.is_zero() {
            errors.push("per_call_timeout must be greater than 0".to_string());
        }

        if self.fetch_barrier_timeout.is_zero() {
            errors.push("fetch_barrier_timeout must be greater than 0".to_string());
        }

        // A single query must be able to finish inside the barrier
        if self.per_call_timeout > self.fetch_barrier_timeout {
            errors.push(format!(
                "per_call_timeout ({:?}) must not exceed fetch_barrier_timeout ({:?})",
                self.per_call_timeout, self.fetch_barrier_timeout
            ));
        }

        if let CommitRetry::Exponential {
            min_delay,
            max_delay,
            ..
        } = self.commit_retry
        {
            if min_delay > max_delay {
                errors.push(format!(
                    "commit retry min_delay ({:?}) must not exceed max_delay ({:?})",
                    min_delay, max_delay
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OFFSET_WORKER_POOL_SIZE`: Concurrent remote calls (default: 32)
    /// - `OFFSET_PER_CALL_TIMEOUT_MS`: Per-call timeout (default: 3000)
    /// - `OFFSET_FETCH_BARRIER_TIMEOUT_MS`: Fetch fan-in timeout (default: 5000)
    /// - `OFFSET_COMMIT_MAX_RETRIES`: Commit retries, 0 disables (default: 0)
    /// - `OFFSET_SHUTDOWN_DRAIN_TIMEOUT_MS`: Shutdown drain window (default: 5000)
    pub fn from_env() -> OffsetStoreResult<Self> {
        let defaults = Self::default();

        let worker_pool_size =
            env_parse::<usize>("OFFSET_WORKER_POOL_SIZE")?.unwrap_or(defaults.worker_pool_size);

        let per_call_timeout = env_parse::<u64>("OFFSET_PER_CALL_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.per_call_timeout);

        let fetch_barrier_timeout = env_parse::<u64>("OFFSET_FETCH_BARRIER_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.fetch_barrier_timeout);

        let commit_retry = match env_parse::<usize>("OFFSET_COMMIT_MAX_RETRIES")? {
            Some(0) | None => CommitRetry::Disabled,
            Some(n) => CommitRetry::exponential(n),
        };

        let shutdown_drain_timeout = env_parse::<u64>("OFFSET_SHUTDOWN_DRAIN_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_drain_timeout);

        let config = Self {
            worker_pool_size,
            per_call_timeout,
            fetch_barrier_timeout,
            commit_retry,
            shutdown_drain_timeout,
        };

        config
            .validate()
            .map_err(|errors| OffsetStoreError::Config(errors.join("; ")))?;

        Ok(config)
    }
}

fn env_parse<T>(key: &str) -> OffsetStoreResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| OffsetStoreError::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
