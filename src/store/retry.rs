//! Retry policies for remote commit calls.
//!
//! Commits are attempted once by default. When [`CommitRetry::Exponential`]
//! is configured, retriable [`RemoteCallError`]s are retried with a
//! jittered exponential backoff from the `backon` crate. Queries are never
//! retried: the fetch barrier already bounds them and a failed query
//! degrades to the sentinel offset.
//!
//! # Example
//!
//! ```rust,no_run
//! use mqtt_offset_store::store::{CommitRetry, RemoteCallError, retry};
//!
//! async fn example() -> Result<(), RemoteCallError> {
//!     retry::with_commit_policy(CommitRetry::exponential(3), || async {
//!         // one commit attempt
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

use std::future::Future;

use backon::{ExponentialBuilder, Retryable};

use super::config::CommitRetry;
use super::error::RemoteCallError;
use super::metrics;

/// Backoff for commit retries, or `None` when retrying is disabled.
pub fn commit_policy(retry: CommitRetry) -> Option<ExponentialBuilder> {
    match retry {
        CommitRetry::Disabled => None,
        CommitRetry::Exponential {
            max_retries,
            min_delay,
            max_delay,
        } => Some(
            ExponentialBuilder::default()
                .with_min_delay(min_delay)
                .with_max_delay(max_delay)
                .with_max_times(max_retries)
                .with_jitter(),
        ),
    }
}

/// Run a commit attempt under the configured retry policy.
///
/// Only errors for which [`RemoteCallError::is_retriable`] holds are retried.
pub async fn with_commit_policy<F, Fut>(retry: CommitRetry, operation: F) -> Result<(), RemoteCallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RemoteCallError>>,
{
    let Some(policy) = commit_policy(retry) else {
        let mut operation = operation;
        return operation().await;
    };

    let result = operation
        .retry(policy)
        .when(RemoteCallError::is_retriable)
        .notify(|e, delay| {
            metrics::record_commit_retry("attempt");
            tracing::debug!(error = %e, ?delay, "Retrying offset commit");
        })
        .await;

    match &result {
        Ok(()) => {}
        Err(e) if e.is_retriable() => {
            metrics::record_commit_retry("exhausted");
            tracing::warn!(error = %e, "Offset commit retries exhausted");
        }
        Err(_) => {}
    }

    result
}
