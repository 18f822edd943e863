//! Address resolver implementations.
//!
//! - [`StaticAddressResolver`]: a broker table held in memory, updated by
//!   whoever owns routing (or by tests)
//! - [`CachingAddressResolver`]: wraps any resolver with a TTL cache so the
//!   store can resolve on every save and fetch

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use crate::types::BrokerAddressMap;

use super::traits::AddressResolver;

/// Resolver backed by an in-memory topic to broker table.
#[derive(Debug, Default)]
pub struct StaticAddressResolver {
    routes: RwLock<HashMap<String, BrokerAddressMap>>,
}

impl StaticAddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single broker route for `first_topic`.
    pub fn with_route(
        self,
        first_topic: impl Into<String>,
        broker_name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        self.add_route(first_topic, broker_name, address);
        self
    }

    /// Add or replace the address of `broker_name` for `first_topic`.
    pub fn add_route(
        &self,
        first_topic: impl Into<String>,
        broker_name: impl Into<String>,
        address: impl Into<String>,
    ) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes
            .entry(first_topic.into())
            .or_default()
            .insert(broker_name.into(), address.into());
    }

    /// Replace every route for `first_topic`.
    pub fn set_routes(&self, first_topic: impl Into<String>, brokers: BrokerAddressMap) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.insert(first_topic.into(), brokers);
    }

    /// Drop all routes for `first_topic`.
    pub fn remove_topic(&self, first_topic: &str) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.remove(first_topic);
    }
}

impl AddressResolver for StaticAddressResolver {
    fn broker_address_map(&self, first_topic: &str) -> BrokerAddressMap {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(first_topic).cloned().unwrap_or_default()
    }
}

/// TTL cache in front of another resolver.
///
/// Empty results are not cached, so a topic that gains its first broker
/// becomes visible on the next call.
pub struct CachingAddressResolver<R> {
    inner: R,
    cache: Cache<String, Arc<BrokerAddressMap>>,
}

impl<R: AddressResolver> CachingAddressResolver<R> {
    /// Cache up to `max_topics` resolutions for `ttl` each.
    pub fn new(inner: R, ttl: Duration, max_topics: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_topics)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    /// Forget the cached resolution for `first_topic`.
    pub fn invalidate(&self, first_topic: &str) {
        self.cache.invalidate(first_topic);
    }

    /// Forget every cached resolution.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: AddressResolver> AddressResolver for CachingAddressResolver<R> {
    fn broker_address_map(&self, first_topic: &str) -> BrokerAddressMap {
        if let Some(hit) = self.cache.get(first_topic) {
            return (*hit).clone();
        }

        let resolved = self.inner.broker_address_map(first_topic);
        if !resolved.is_empty() {
            debug!(topic = first_topic, brokers = resolved.len(), "Caching broker addresses");
            self.cache
                .insert(first_topic.to_string(), Arc::new(resolved.clone()));
        }
        resolved
    }
}
