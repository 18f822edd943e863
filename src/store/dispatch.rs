//! Bounded dispatch of blocking remote calls.
//!
//! Transports are synchronous, so every commit and query runs on the
//! tokio blocking pool of the runtime the manager was built with. The
//! dispatcher provides:
//! - A worker bound: each call holds one of `worker_pool_size` permits for
//!   as long as its blocking closure runs. Saturated submissions wait up to
//!   the per-call timeout for a permit, then fail with
//!   [`RemoteCallError::Timeout`] without reaching the transport.
//! - A per-call timeout. A call that exceeds it is abandoned: the caller
//!   sees [`RemoteCallError::Timeout`], the thread finishes the call in the
//!   background and only then returns its permit.
//! - In-flight tracking of spawned tasks, so tests and shutdown can wait
//!   for quiescence.
//! - Shutdown: new work is rejected, in-flight work gets a drain window,
//!   then whatever remains is cancelled through a broadcast signal.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{CommitRetry, OffsetStoreConfig};
use super::error::{OffsetStoreError, OffsetStoreResult, RemoteCallError};
use super::{metrics, retry};

/// How long cancelled tasks get to unwind after the shutdown signal.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Remote operation, used for metric labels and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteOp {
    Commit,
    Query,
}

impl RemoteOp {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RemoteOp::Commit => "commit",
            RemoteOp::Query => "query",
        }
    }
}

/// Counter of tracked tasks with an idle notification.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Registers one tracked task for as long as it is alive.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn new(inflight: &Arc<InFlight>) -> Self {
        inflight.count.fetch_add(1, Ordering::SeqCst);
        metrics::INFLIGHT_TASKS.inc();
        InFlightGuard(Arc::clone(inflight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics::INFLIGHT_TASKS.dec();
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

struct DispatcherInner {
    handle: Handle,
    permits: Arc<Semaphore>,
    per_call_timeout: Duration,
    commit_retry: CommitRetry,
    inflight: Arc<InFlight>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
}

/// Shared worker pool for commit and query calls.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub(crate) fn new(config: &OffsetStoreConfig, handle: Handle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(DispatcherInner {
                handle,
                permits: Arc::new(Semaphore::new(config.worker_pool_size)),
                per_call_timeout: config.per_call_timeout,
                commit_retry: config.commit_retry,
                inflight: Arc::new(InFlight::default()),
                shutdown_tx,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of tracked tasks not yet finished.
    pub(crate) fn pending(&self) -> usize {
        self.inner.inflight.count.load(Ordering::SeqCst)
    }

    /// Permits currently free in the worker pool.
    #[cfg(test)]
    pub(crate) fn available_workers(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Wait until no tracked task is running.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.inner.inflight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Spawn a tracked task.
    ///
    /// The task receives the shutdown signal and is expected to stop
    /// promptly once it fires.
    pub(crate) fn spawn_tracked<F, Fut>(&self, task: F) -> OffsetStoreResult<JoinHandle<Fut::Output>>
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        // Subscribe before checking the flag so a concurrent shutdown is either
        // observed here or delivered to the receiver.
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        if self.is_shut_down() {
            return Err(OffsetStoreError::ShutDown);
        }

        let guard = InFlightGuard::new(&self.inner.inflight);
        let fut = task(shutdown_rx);
        Ok(self.inner.handle.spawn(async move {
            let _guard = guard;
            fut.await
        }))
    }

    /// Run one blocking transport call under the worker bound and timeout.
    pub(crate) async fn call<T, F>(&self, op: RemoteOp, call: F) -> Result<T, RemoteCallError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RemoteCallError> + Send + 'static,
    {
        let after = self.inner.per_call_timeout;
        let acquire = Arc::clone(&self.inner.permits).acquire_owned();
        let permit = match tokio::time::timeout(after, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RemoteCallError::Cancelled),
            Err(_) => {
                debug!(
                    op = op.as_str(),
                    ?after,
                    "No offset worker free within per-call timeout"
                );
                let err = RemoteCallError::Timeout { after };
                metrics::record_remote_call(
                    op.as_str(),
                    err.as_metric_label(),
                    after.as_secs_f64(),
                );
                return Err(err);
            }
        };

        let started = Instant::now();
        let blocking = self.inner.handle.spawn_blocking(move || {
            let _permit = permit;
            call()
        });

        let result = match tokio::time::timeout(self.inner.per_call_timeout, blocking).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RemoteCallError::Other(format!(
                "transport call panicked: {}",
                join_error
            ))),
            Err(_) => Err(RemoteCallError::Timeout {
                after: self.inner.per_call_timeout,
            }),
        };

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.as_metric_label(),
        };
        metrics::record_remote_call(op.as_str(), status, started.elapsed().as_secs_f64());

        result
    }

    /// Run a commit call under the configured retry policy.
    pub(crate) async fn commit<F>(&self, call: F) -> Result<(), RemoteCallError>
    where
        F: Fn() -> Result<(), RemoteCallError> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let dispatcher = self;
        retry::with_commit_policy(self.inner.commit_retry, move || {
            let call = Arc::clone(&call);
            dispatcher.call(RemoteOp::Commit, move || call())
        })
        .await
    }

    /// Stop accepting work, drain for up to `drain`, then cancel the rest.
    ///
    /// Idempotent. Blocking calls already running on a worker thread cannot
    /// be interrupted; their results are discarded when they return.
    pub(crate) async fn shutdown(&self, drain: Duration) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            self.wait_idle().await;
            return;
        }

        info!(pending = self.pending(), "Shutting down offset dispatcher");

        if tokio::time::timeout(drain, self.wait_idle()).await.is_err() {
            warn!(
                pending = self.pending(),
                ?drain,
                "Drain window elapsed, cancelling in-flight offset calls"
            );
        }

        let _ = self.inner.shutdown_tx.send(());
        self.inner.permits.close();

        if tokio::time::timeout(CANCEL_GRACE, self.wait_idle())
            .await
            .is_err()
        {
            warn!(
                pending = self.pending(),
                "Offset tasks still running after cancellation"
            );
        }

        debug!("Offset dispatcher shutdown complete");
    }

    /// Run [`shutdown`](Self::shutdown) on the dispatch runtime without
    /// waiting for it. No-op once shutdown has started.
    pub(crate) fn shutdown_in_background(&self, drain: Duration) {
        if self.is_shut_down() {
            return;
        }
        let dispatcher = self.clone();
        self.inner.handle.spawn(async move {
            dispatcher.shutdown(drain).await;
        });
    }
}
