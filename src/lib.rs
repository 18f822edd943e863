//! # mqtt-offset-store
//! Offset checkpoints for an MQTT bridge over broker-hosted light message
//! queues.
//!
//! An MQTT subscription is backed by one queue shard on every broker that
//! hosts its first-level topic. This crate keeps track of how far each
//! client has consumed those shards by committing and querying offsets on
//! the brokers, concurrently and without letting one unreachable broker
//! hold up or corrupt the rest.
//!
//! # Goals
//! - Never block the caller on remote I/O
//! - Always hand back a complete offset map, degrading per queue
//! - Keep the transport and routing pluggable
//!
//! ## Getting started
//! Implement [`OffsetTransport`](store::OffsetTransport) for your broker
//! client and [`AddressResolver`](store::AddressResolver) for your routing
//! table, then build an [`OffsetStoreManager`](store::OffsetStoreManager):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mqtt_offset_store::prelude::*;
//!
//! struct Transport;
//!
//! impl OffsetTransport for Transport {
//!     fn commit(
//!         &self,
//!         _address: &str,
//!         _queue: &QueueRef,
//!         _client: &ClientIdentity,
//!         _offset: Offset,
//!     ) -> Result<(), RemoteCallError> {
//!         Ok(())
//!     }
//!
//!     fn query(
//!         &self,
//!         _address: &str,
//!         _queue: &QueueRef,
//!         _client: &ClientIdentity,
//!     ) -> Result<Offset, RemoteCallError> {
//!         Ok(Offset::NONE)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = StaticAddressResolver::new().with_route("t", "broker-a", "10.0.0.1:10911");
//!     let manager = OffsetStoreManager::with_current_runtime(
//!         resolver,
//!         Arc::new(Transport),
//!         OffsetStoreConfig::from_env()?,
//!     )?;
//!
//!     let client = ClientIdentity::new("gid@@@conn-1")?;
//!     let subscription = Subscription::new("t/t1/t2")?;
//!
//!     let offsets = manager.fetch_offsets(&client, &subscription)?.await;
//!     manager.save(&client, &OffsetMap::from([(subscription, offsets)]))?;
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod constants;
pub mod runtime;
pub mod store;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports for embedding the offset store.
    pub use crate::store::{
        AddressResolver, CachingAddressResolver, CommitRetry, OffsetFetch, OffsetStoreConfig,
        OffsetStoreError, OffsetStoreManager, OffsetStoreResult, OffsetTransport,
        RemoteCallError, StaticAddressResolver,
    };
    pub use crate::types::{
        BrokerAddressMap, ClientIdentity, Offset, OffsetMap, QueueOffsets, QueueRef,
        Subscription,
    };
}
