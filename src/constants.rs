//! Centralized naming and tuning constants.
//!
//! # Categories
//!
//! - **Queue Naming**: How MQTT subscriptions map onto broker-side light message queues
//! - **Offset Semantics**: Sentinel values shared with callers
//! - **Dispatch Defaults**: Worker pool and timeout defaults for [`OffsetStoreConfig`]
//!
//! [`OffsetStoreConfig`]: crate::store::OffsetStoreConfig

// =============================================================================
// Queue Naming
// =============================================================================

/// Shard index used for every light message queue.
///
/// Each broker hosts exactly one shard per subscription queue, so the
/// index is fixed and the broker name is what distinguishes shards.
pub const LMQ_QUEUE_ID: u32 = 0;

/// Prefix the brokers use for light message queue topics and consumer groups.
pub const LMQ_PREFIX: &str = "%LMQ%";

/// Level separator inside MQTT topic filters.
pub const TOPIC_LEVEL_SEPARATOR: char = '/';

/// Replacement for [`TOPIC_LEVEL_SEPARATOR`] in broker-side topic names.
pub const BROKER_TOPIC_SEPARATOR: char = '%';

/// Single-level MQTT wildcard.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Multi-level MQTT wildcard.
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Prefix marking a shared subscription (`$share/{group}/{filter}`).
pub const SHARED_SUBSCRIPTION_PREFIX: &str = "$share/";

/// Delimiter between the group id and the connection id in a client identity.
pub const CLIENT_ID_DELIMITER: &str = "@@@";

// =============================================================================
// Offset Semantics
// =============================================================================

/// Offset reported for queues with no committed position.
///
/// Callers must treat it as "start from the beginning", not as a real position.
pub const NO_COMMITTED_OFFSET: u64 = 0;

// =============================================================================
// Dispatch Defaults
// =============================================================================

/// Default number of concurrent remote offset calls.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 32;

/// Default upper bound for a single commit or query call.
pub const DEFAULT_PER_CALL_TIMEOUT_MS: u64 = 3_000;

/// Default upper bound for a full fetch fan-in.
pub const DEFAULT_FETCH_BARRIER_TIMEOUT_MS: u64 = 5_000;

/// Default time `shutdown` waits for in-flight calls before cancelling them.
pub const DEFAULT_SHUTDOWN_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Thread name used by [`DispatchRuntime`](crate::runtime::DispatchRuntime).
pub const DISPATCH_THREAD_NAME: &str = "offset-dispatch";
