//! Error types for the offset store.
//!
//! # Error Handling Patterns
//!
//! The store separates two classes of failure:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! [`OffsetStoreError`] covers contract violations and lifecycle misuse:
//! an empty client identity, an unparsable topic filter, an offset map
//! whose queue keys belong to another subscription, or calls made after
//! shutdown. These are returned to the caller immediately and should not
//! be retried.
//!
//! ## Best-Effort (Log and Continue)
//!
//! [`RemoteCallError`] is always scoped to one queue shard. It is logged
//! and counted at the dispatch boundary and never surfaces from `save` or
//! `fetch_offsets`:
//! - save: the commit for that shard is dropped (worst case: reprocessing)
//! - fetch: the shard reports [`Offset::NONE`](crate::types::Offset::NONE)
//!
//! An empty broker resolution is neither: it means "nothing to do".

use std::time::Duration;

use thiserror::Error;

/// Result type for offset store operations.
pub type OffsetStoreResult<T> = Result<T, OffsetStoreError>;

/// Errors returned to callers of the offset store.
#[derive(Debug, Error)]
pub enum OffsetStoreError {
    /// Client identity was empty.
    #[error("Client identity must not be empty")]
    InvalidClientIdentity,

    /// Topic filter could not be used as a subscription.
    #[error("Invalid subscription '{filter}': {reason}")]
    InvalidSubscription { filter: String, reason: String },

    /// A queue key in an offset map does not belong to its subscription:
    /// its topic differs or its shard index is not the derived one.
    #[error("Queue {queue} does not belong to subscription '{subscription}'")]
    QueueTopicMismatch { subscription: String, queue: String },

    /// The manager has been shut down.
    #[error("Offset store manager is shut down")]
    ShutDown,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a single remote commit or query against one broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCallError {
    /// The call did not finish within the per-call timeout.
    #[error("Remote call timed out after {after:?}")]
    Timeout { after: Duration },

    /// The broker could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker answered with an error.
    #[error("Broker rejected request (code {code}): {message}")]
    Rejected { code: i32, message: String },

    /// The call was cancelled by manager shutdown.
    #[error("Remote call cancelled")]
    Cancelled,

    /// Any other transport failure.
    #[error("Remote call failed: {0}")]
    Other(String),
}

impl RemoteCallError {
    /// Whether retrying the same call may succeed.
    ///
    /// Broker rejections are deterministic and cancellations are
    /// deliberate; everything else is treated as transient.
    pub fn is_retriable(&self) -> bool {
        match self {
            RemoteCallError::Timeout { .. } => true,
            RemoteCallError::Connection(_) => true,
            RemoteCallError::Other(_) => true,
            RemoteCallError::Rejected { .. } => false,
            RemoteCallError::Cancelled => false,
        }
    }

    /// Returns a string label for metrics.
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            RemoteCallError::Timeout { .. } => "timeout",
            RemoteCallError::Connection(_) => "connection",
            RemoteCallError::Rejected { .. } => "rejected",
            RemoteCallError::Cancelled => "cancelled",
            RemoteCallError::Other(_) => "other",
        }
    }
}

impl From<std::io::Error> for RemoteCallError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => RemoteCallError::Timeout {
                after: Duration::ZERO,
            },
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe => RemoteCallError::Connection(e.to_string()),
            _ => RemoteCallError::Other(e.to_string()),
        }
    }
}
