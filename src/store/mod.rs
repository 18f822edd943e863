//! Offset storage across the brokers hosting MQTT subscriptions.
//!
//! # Architecture
//!
//! ```text
//!                   save / fetch_offsets
//!                           |
//!                 +---------v----------+
//!                 | OffsetStoreManager |---- AddressResolver (first topic -> brokers)
//!                 +---------+----------+
//!                           | one call per (broker, queue)
//!                 +---------v----------+
//!                 |     Dispatcher     |  permits, per-call timeout,
//!                 +---------+----------+  in-flight tracking, shutdown
//!                           |
//!                 +---------v----------+
//!                 |  OffsetTransport   |  blocking commit / query
//!                 +--------------------+
//! ```
//!
//! # Key Components
//!
//! - [`OffsetStoreManager`]: fans save and fetch out to every hosting broker
//! - [`OffsetFetch`]: completion handle that always yields a complete map
//! - [`AddressResolver`] / [`OffsetTransport`]: collaborator traits
//! - [`CachingAddressResolver`]: TTL cache for resolvers
//! - [`OffsetStoreConfig`]: pool size, timeouts, retry and shutdown policy
//!
//! # Sentinel Offset
//!
//! [`Offset::NONE`](crate::types::Offset::NONE) (`0`) stands for "no
//! committed offset". A fetch reports it both for queues never committed
//! and for queues whose broker could not be queried in time; callers
//! restart those queues from the beginning.

pub mod config;
mod dispatch;
pub mod error;
mod manager;
pub mod metrics;
mod resolver;
pub mod retry;
mod traits;

#[cfg(any(test, feature = "test-utilities"))]
pub mod mock;

pub use config::{CommitRetry, OffsetStoreConfig};
pub use error::{OffsetStoreError, OffsetStoreResult, RemoteCallError};
pub use manager::{OffsetFetch, OffsetStoreManager};
#[cfg(any(test, feature = "test-utilities"))]
pub use mock::{MockBehavior, MockTransport};
pub use resolver::{CachingAddressResolver, StaticAddressResolver};
pub use traits::{AddressResolver, OffsetTransport};
