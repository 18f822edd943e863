//! The offset store manager.
//!
//! Resolves which brokers back a subscription, fans commit and query calls
//! out to them through the [`Dispatcher`], and folds the per-queue results
//! into one map.
//!
//! # Failure policy
//!
//! - `save` is fire-and-forget. A failed commit is logged and counted; it
//!   never reaches the caller and never stops sibling commits.
//! - `fetch_offsets` always yields one entry per queue implied by the broker
//!   snapshot. Queues whose query failed, timed out, or was still pending at
//!   the barrier deadline report [`Offset::NONE`].
//! - Only contract violations (bad input, use after shutdown) are returned
//!   as errors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::LMQ_QUEUE_ID;
use crate::types::{ClientIdentity, Offset, OffsetMap, QueueOffsets, QueueRef, Subscription};

use super::config::OffsetStoreConfig;
use super::dispatch::{Dispatcher, RemoteOp};
use super::error::{OffsetStoreError, OffsetStoreResult};
use super::metrics;
use super::traits::{AddressResolver, OffsetTransport};

/// Coordinates offset commits and queries across the brokers hosting a
/// subscription.
///
/// The manager holds no offset state of its own; durability lives in the
/// brokers, so a new manager needs no recovery. Remote calls run on the
/// blocking pool of the runtime behind `handle`, bounded by
/// [`OffsetStoreConfig::worker_pool_size`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use mqtt_offset_store::prelude::*;
/// use mqtt_offset_store::store::{MockTransport, StaticAddressResolver};
///
/// # async fn example() -> OffsetStoreResult<()> {
/// let resolver = StaticAddressResolver::new().with_route("t", "brokerA", "127.0.0.1:10911");
/// let manager = OffsetStoreManager::with_current_runtime(
///     resolver,
///     Arc::new(MockTransport::new()),
///     OffsetStoreConfig::default(),
/// )?;
///
/// let client = ClientIdentity::new("gid_test@@@qwewqee")?;
/// let subscription = Subscription::new("t/t1/t2")?;
/// let offsets = manager.fetch_offsets(&client, &subscription)?.await;
/// # manager.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct OffsetStoreManager<R, T: ?Sized> {
    resolver: R,
    transport: Arc<T>,
    config: OffsetStoreConfig,
    dispatcher: Dispatcher,
}

impl<R, T> OffsetStoreManager<R, T>
where
    R: AddressResolver,
    T: OffsetTransport + ?Sized + 'static,
{
    /// Create a manager whose remote calls run on the runtime behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`OffsetStoreError::Config`] if `config` does not validate.
    pub fn new(
        resolver: R,
        transport: Arc<T>,
        config: OffsetStoreConfig,
        handle: Handle,
    ) -> OffsetStoreResult<Self> {
        config
            .validate()
            .map_err(|errors| OffsetStoreError::Config(errors.join("; ")))?;

        metrics::init_metrics();

        info!(
            worker_pool_size = config.worker_pool_size,
            per_call_timeout_ms = config.per_call_timeout.as_millis() as u64,
            fetch_barrier_timeout_ms = config.fetch_barrier_timeout.as_millis() as u64,
            commit_retry = config.commit_retry.is_enabled(),
            "Offset store manager started"
        );

        let dispatcher = Dispatcher::new(&config, handle);
        Ok(Self {
            resolver,
            transport,
            config,
            dispatcher,
        })
    }

    /// Create a manager on the tokio runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns [`OffsetStoreError::Config`] when called outside a runtime
    /// or with an invalid `config`.
    pub fn with_current_runtime(
        resolver: R,
        transport: Arc<T>,
        config: OffsetStoreConfig,
    ) -> OffsetStoreResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| OffsetStoreError::Config(format!("No tokio runtime available: {}", e)))?;
        Self::new(resolver, transport, config, handle)
    }

    /// The validated configuration this manager runs with.
    pub fn config(&self) -> &OffsetStoreConfig {
        &self.config
    }

    /// The resolver used to look up brokers for each subscription.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Persist `offsets` for `client` on every broker hosting each subscription.
    ///
    /// Returns once broker snapshots are resolved and every commit is
    /// queued; the commits themselves complete in the background. Offsets
    /// for queues on brokers absent from the current snapshot are skipped.
    ///
    /// # Errors
    ///
    /// - [`OffsetStoreError::QueueTopicMismatch`] if a queue key does not
    ///   belong to its subscription (other topic, or a shard index the store
    ///   never derives). Nothing is dispatched in that case.
    /// - [`OffsetStoreError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn save(&self, client: &ClientIdentity, offsets: &OffsetMap) -> OffsetStoreResult<()> {
        if self.dispatcher.is_shut_down() {
            return Err(OffsetStoreError::ShutDown);
        }
        check_offset_map(offsets)?;

        for (subscription, queue_offsets) in offsets {
            if queue_offsets.is_empty() {
                continue;
            }

            let brokers = self.resolver.broker_address_map(subscription.first_topic());
            if brokers.is_empty() {
                debug!(
                    client_id = %client,
                    subscription = %subscription,
                    "No brokers host subscription, nothing to commit"
                );
                metrics::record_empty_resolution("save");
                continue;
            }

            let mut dispatched = 0usize;
            for (broker_name, address) in brokers {
                let queue = QueueRef::for_subscription(subscription, &broker_name);
                let Some(&offset) = queue_offsets.get(&queue) else {
                    continue;
                };
                self.dispatch_commit(client.clone(), queue, address, offset)?;
                dispatched += 1;
            }

            if dispatched < queue_offsets.len() {
                debug!(
                    client_id = %client,
                    subscription = %subscription,
                    skipped = queue_offsets.len() - dispatched,
                    "Offsets for queues on unresolved brokers skipped"
                );
            }
        }

        Ok(())
    }

    /// Read the committed offsets of `client` for every queue backing
    /// `subscription`.
    ///
    /// Queries are dispatched before this returns. The returned
    /// [`OffsetFetch`] resolves once every query finished or the fetch
    /// barrier timeout elapsed, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns [`OffsetStoreError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn fetch_offsets(
        &self,
        client: &ClientIdentity,
        subscription: &Subscription,
    ) -> OffsetStoreResult<OffsetFetch> {
        if self.dispatcher.is_shut_down() {
            return Err(OffsetStoreError::ShutDown);
        }

        let brokers = self.resolver.broker_address_map(subscription.first_topic());
        if brokers.is_empty() {
            debug!(
                client_id = %client,
                subscription = %subscription,
                "No brokers host subscription, returning empty offsets"
            );
            metrics::record_empty_resolution("fetch");
            return Ok(OffsetFetch::ready(HashMap::new()));
        }

        let targets: Vec<(QueueRef, String)> = brokers
            .into_iter()
            .map(|(broker_name, address)| {
                (QueueRef::for_subscription(subscription, &broker_name), address)
            })
            .collect();

        // Every derived queue starts at the sentinel; successes overwrite it.
        let seeded: QueueOffsets = targets
            .iter()
            .map(|(queue, _)| (queue.clone(), Offset::NONE))
            .collect();

        let fan_in = FanIn {
            dispatcher: self.dispatcher.clone(),
            transport: Arc::clone(&self.transport),
            client: client.clone(),
            subscription: subscription.clone(),
            deadline: Instant::now() + self.config.fetch_barrier_timeout,
        };
        let offsets = seeded.clone();
        let task = self
            .dispatcher
            .spawn_tracked(move |shutdown| fan_in.run(targets, offsets, shutdown))?;

        Ok(OffsetFetch::pending(task, seeded))
    }

    /// Number of background commit and fetch tasks not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Wait until every background task has finished.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shut_down(&self) -> bool {
        self.dispatcher.is_shut_down()
    }

    /// Stop the manager.
    ///
    /// New `save` and `fetch_offsets` calls fail with
    /// [`OffsetStoreError::ShutDown`]. In-flight work gets up to
    /// [`OffsetStoreConfig::shutdown_drain_timeout`] to finish; after that it
    /// is cancelled and pending fetches resolve with the sentinel for their
    /// unfinished queues. Idempotent.
    pub async fn shutdown(&self) {
        self.dispatcher
            .shutdown(self.config.shutdown_drain_timeout)
            .await
    }

    fn dispatch_commit(
        &self,
        client: ClientIdentity,
        queue: QueueRef,
        address: String,
        offset: Offset,
    ) -> OffsetStoreResult<()> {
        let dispatcher = self.dispatcher.clone();
        let transport = Arc::clone(&self.transport);

        self.dispatcher.spawn_tracked(move |mut shutdown| async move {
            let commit = {
                let (client, queue) = (client.clone(), queue.clone());
                dispatcher.commit(move || transport.commit(&address, &queue, &client, offset))
            };

            tokio::select! {
                result = commit => match result {
                    Ok(()) => debug!(
                        client_id = %client,
                        queue = %queue,
                        offset = offset.value(),
                        "Offset committed"
                    ),
                    Err(e) => warn!(
                        client_id = %client,
                        broker = queue.broker_name(),
                        queue = %queue,
                        offset = offset.value(),
                        error = %e,
                        "Offset commit failed"
                    ),
                },
                _ = shutdown.recv() => debug!(
                    client_id = %client,
                    queue = %queue,
                    "Offset commit cancelled by shutdown"
                ),
            }
        })?;

        Ok(())
    }
}

impl<R, T: ?Sized> Drop for OffsetStoreManager<R, T> {
    fn drop(&mut self) {
        self.dispatcher
            .shutdown_in_background(self.config.shutdown_drain_timeout);
    }
}

/// Every queue key must be a shard the store derives for the subscription
/// it is filed under: same topic, shard index [`LMQ_QUEUE_ID`].
fn check_offset_map(offsets: &OffsetMap) -> OffsetStoreResult<()> {
    for (subscription, queue_offsets) in offsets {
        if let Some(queue) = queue_offsets.keys().find(|queue| {
            queue.topic() != subscription.queue_name() || queue.shard_index() != LMQ_QUEUE_ID
        }) {
            return Err(OffsetStoreError::QueueTopicMismatch {
                subscription: subscription.to_string(),
                queue: queue.to_string(),
            });
        }
    }
    Ok(())
}

/// State of one fetch fan-out, moved into its aggregation task.
struct FanIn<T: ?Sized> {
    dispatcher: Dispatcher,
    transport: Arc<T>,
    client: ClientIdentity,
    subscription: Subscription,
    deadline: Instant,
}

impl<T: OffsetTransport + ?Sized + 'static> FanIn<T> {
    async fn run(
        self,
        targets: Vec<(QueueRef, String)>,
        mut offsets: QueueOffsets,
        mut shutdown: broadcast::Receiver<()>,
    ) -> QueueOffsets {
        let mut queries = JoinSet::new();
        for (queue, address) in targets {
            let dispatcher = self.dispatcher.clone();
            let transport = Arc::clone(&self.transport);
            let client = self.client.clone();
            queries.spawn_on(
                async move {
                    let call_queue = queue.clone();
                    let result = dispatcher
                        .call(RemoteOp::Query, move || {
                            transport.query(&address, &call_queue, &client)
                        })
                        .await;
                    (queue, result)
                },
                self.dispatcher.handle(),
            );
        }

        loop {
            tokio::select! {
                joined = queries.join_next() => match joined {
                    None => break,
                    Some(Ok((queue, Ok(offset)))) => {
                        offsets.insert(queue, offset);
                    }
                    Some(Ok((queue, Err(e)))) => {
                        warn!(
                            client_id = %self.client,
                            broker = queue.broker_name(),
                            queue = %queue,
                            error = %e,
                            "Offset query failed, reporting sentinel offset"
                        );
                        metrics::record_fetch_fallback(e.as_metric_label());
                    }
                    Some(Err(e)) => {
                        warn!(
                            client_id = %self.client,
                            error = %e,
                            "Offset query task failed, reporting sentinel offset"
                        );
                        metrics::record_fetch_fallback("task_failed");
                    }
                },
                _ = tokio::time::sleep_until(self.deadline) => {
                    let pending = queries.len();
                    warn!(
                        client_id = %self.client,
                        subscription = %self.subscription,
                        pending,
                        "Fetch barrier timeout elapsed, reporting sentinel for pending queues"
                    );
                    metrics::record_barrier_timeout();
                    for _ in 0..pending {
                        metrics::record_fetch_fallback("barrier_timeout");
                    }
                    break;
                }
                _ = shutdown.recv() => {
                    let pending = queries.len();
                    debug!(
                        client_id = %self.client,
                        subscription = %self.subscription,
                        pending,
                        "Fetch cancelled by shutdown"
                    );
                    for _ in 0..pending {
                        metrics::record_fetch_fallback("shutdown");
                    }
                    break;
                }
            }
        }

        queries.abort_all();
        offsets
    }
}

/// Completion handle for [`OffsetStoreManager::fetch_offsets`].
///
/// Resolves to a map with one entry per queue in the broker snapshot taken
/// when the fetch was issued. Never fails: if the aggregation task is lost
/// the handle yields the all-sentinel map. Dropping the handle does not
/// cancel the queries.
pub struct OffsetFetch {
    state: FetchState,
}

enum FetchState {
    Ready(Option<QueueOffsets>),
    Pending {
        task: JoinHandle<QueueOffsets>,
        fallback: Option<QueueOffsets>,
    },
}

impl OffsetFetch {
    fn ready(offsets: QueueOffsets) -> Self {
        Self {
            state: FetchState::Ready(Some(offsets)),
        }
    }

    fn pending(task: JoinHandle<QueueOffsets>, fallback: QueueOffsets) -> Self {
        Self {
            state: FetchState::Pending {
                task,
                fallback: Some(fallback),
            },
        }
    }

    /// Whether the result is available without waiting.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            FetchState::Ready(_) => true,
            FetchState::Pending { task, .. } => task.is_finished(),
        }
    }
}

impl Future for OffsetFetch {
    type Output = QueueOffsets;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FetchState::Ready(offsets) => Poll::Ready(offsets.take().unwrap_or_default()),
            FetchState::Pending { task, fallback } => match Pin::new(task).poll(cx) {
                Poll::Ready(Ok(offsets)) => Poll::Ready(offsets),
                Poll::Ready(Err(e)) => {
                    warn!(error = %e, "Offset fetch task lost, reporting sentinel offsets");
                    let fallback = fallback.take().unwrap_or_default();
                    for _ in 0..fallback.len() {
                        metrics::record_fetch_fallback("task_failed");
                    }
                    Poll::Ready(fallback)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl std::fmt::Debug for OffsetFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetFetch")
            .field("finished", &self.is_finished())
            .finish()
    }
}
