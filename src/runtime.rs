//! Dedicated runtime for offset dispatch.
//!
//! [`OffsetStoreManager`](crate::store::OffsetStoreManager) runs its remote
//! calls on whatever tokio runtime its handle points at. Embedders that are
//! already async pass their own handle. Synchronous embedders (or ones that
//! want offset traffic isolated from their request path) can own a
//! [`DispatchRuntime`] instead and block on fetches through it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mqtt_offset_store::prelude::*;
//! use mqtt_offset_store::runtime::DispatchRuntime;
//! use mqtt_offset_store::store::{MockTransport, StaticAddressResolver};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OffsetStoreConfig::default();
//!     let runtime = DispatchRuntime::for_store(&config)?;
//!
//!     let manager = OffsetStoreManager::new(
//!         StaticAddressResolver::new(),
//!         Arc::new(MockTransport::new()),
//!         config,
//!         runtime.handle(),
//!     )?;
//!
//!     let client = ClientIdentity::new("gid@@@conn")?;
//!     let subscription = Subscription::new("t/a")?;
//!     let offsets = runtime.block_on(manager.fetch_offsets(&client, &subscription)?);
//!     println!("{offsets:?}");
//!
//!     runtime.block_on(manager.shutdown());
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::constants::DISPATCH_THREAD_NAME;
use crate::store::OffsetStoreConfig;

/// Configuration for a [`DispatchRuntime`].
#[derive(Debug, Clone)]
pub struct DispatchRuntimeConfig {
    /// Async worker threads. These only drive timers and fan-in, so a
    /// couple is enough.
    ///
    /// Default: 2
    pub worker_threads: usize,

    /// Upper bound on blocking threads running transport calls.
    ///
    /// Default: the store's default worker pool size
    pub max_blocking_threads: usize,

    /// Thread name prefix.
    ///
    /// Default: "offset-dispatch"
    pub thread_name: String,
}

impl Default for DispatchRuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_blocking_threads: OffsetStoreConfig::default().worker_pool_size,
            thread_name: DISPATCH_THREAD_NAME.to_string(),
        }
    }
}

/// Owned multi-thread runtime for offset dispatch.
pub struct DispatchRuntime {
    runtime: Runtime,
}

impl DispatchRuntime {
    pub fn new(config: DispatchRuntimeConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name(&config.thread_name)
            .enable_all()
            .build()?;

        Ok(Self { runtime })
    }

    /// Runtime sized so every worker permit of `store` can hold a thread.
    pub fn for_store(store: &OffsetStoreConfig) -> io::Result<Self> {
        Self::new(DispatchRuntimeConfig {
            max_blocking_threads: store.worker_pool_size,
            ..Default::default()
        })
    }

    /// Handle to pass to [`OffsetStoreManager::new`](crate::store::OffsetStoreManager::new).
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Block the current thread on `future`.
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Shut the runtime down, waiting up to `timeout` for blocking calls.
    ///
    /// Shut the manager down first so in-flight commits get their drain
    /// window.
    pub fn shutdown(self, timeout: Duration) {
        self.runtime.shutdown_timeout(timeout);
    }
}
