//! Collaborator traits the offset store is composed from.
//!
//! These traits abstract the two external dependencies of the store,
//! allowing for:
//! - A routing-table backed resolver and a wire transport in production
//! - Scripted in-memory implementations in tests
//!
//! Both are synchronous. The store never calls a transport method on the
//! caller's thread; it runs them on the blocking pool with a per-call
//! timeout (see [`dispatch`](super::dispatch)).
//!
//! # Available Implementations
//!
//! - [`StaticAddressResolver`](super::StaticAddressResolver): fixed broker table
//! - [`CachingAddressResolver`](super::CachingAddressResolver): TTL cache over any resolver
//! - [`MockTransport`](super::MockTransport): scripted transport for testing

use std::sync::Arc;

use crate::types::{BrokerAddressMap, ClientIdentity, Offset, QueueRef};

use super::error::RemoteCallError;

/// Resolves which brokers currently host a first-level topic.
pub trait AddressResolver: Send + Sync {
    /// Broker name to address for `first_topic`.
    ///
    /// Unknown topics yield an empty map, never an error. Called on every
    /// save and fetch, so implementations should cache.
    fn broker_address_map(&self, first_topic: &str) -> BrokerAddressMap;
}

/// Performs single offset calls against one broker.
pub trait OffsetTransport: Send + Sync {
    /// Persist `offset` as the committed position of `client` on `queue`.
    fn commit(
        &self,
        address: &str,
        queue: &QueueRef,
        client: &ClientIdentity,
        offset: Offset,
    ) -> Result<(), RemoteCallError>;

    /// Read the committed position of `client` on `queue`.
    fn query(
        &self,
        address: &str,
        queue: &QueueRef,
        client: &ClientIdentity,
    ) -> Result<Offset, RemoteCallError>;
}

impl<T: AddressResolver + ?Sized> AddressResolver for Arc<T> {
    fn broker_address_map(&self, first_topic: &str) -> BrokerAddressMap {
        (**self).broker_address_map(first_topic)
    }
}

impl<T: OffsetTransport + ?Sized> OffsetTransport for Arc<T> {
    fn commit(
        &self,
        address: &str,
        queue: &QueueRef,
        client: &ClientIdentity,
        offset: Offset,
    ) -> Result<(), RemoteCallError> {
        (**self).commit(address, queue, client, offset)
    }

    fn query(
        &self,
        address: &str,
        queue: &QueueRef,
        client: &ClientIdentity,
    ) -> Result<Offset, RemoteCallError> {
        (**self).query(address, queue, client)
    }
}
