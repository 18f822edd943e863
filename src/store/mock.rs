//! In-memory scripted transport for testing.
//!
//! [`MockTransport`] keeps committed offsets in a map, answers queries from
//! it, and records every call it receives. Per-broker behavior can be
//! scripted to delay, fail or panic, which is enough to exercise every
//! partial-failure path of the manager without a network.
//!
//! # Usage
//!
//! This module is available when the `test-utilities` feature is enabled,
//! or during unit tests:
//!
//! ```toml
//! [dev-dependencies]
//! mqtt-offset-store = { path = ".", features = ["test-utilities"] }
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::types::{ClientIdentity, Offset, QueueRef};

use super::error::RemoteCallError;
use super::traits::OffsetTransport;

/// Scripted behavior for calls against one broker.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Sleep, then answer normally.
    Delay(Duration),
    /// Fail every call with this error.
    Fail(RemoteCallError),
    /// Fail the next `n` calls with this error, then answer normally.
    FailTimes(usize, RemoteCallError),
    /// Sleep, then fail with this error.
    DelayThenFail(Duration, RemoteCallError),
    /// Panic inside the transport.
    Panic,
}

/// A recorded commit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCall {
    pub address: String,
    pub queue: QueueRef,
    pub client: ClientIdentity,
    pub offset: Offset,
}

/// A recorded query call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCall {
    pub address: String,
    pub queue: QueueRef,
    pub client: ClientIdentity,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    /// Committed offsets: (queue, client) -> offset
    offsets: Mutex<HashMap<(QueueRef, ClientIdentity), Offset>>,
    /// Scripted behavior per broker name
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    commits: Mutex<Vec<CommitCall>>,
    queries: Mutex<Vec<QueryCall>>,
    /// Calls currently executing inside the transport
    active: AtomicUsize,
    /// Highest value `active` has reached
    max_active: AtomicUsize,
}

/// Tracks one executing call in `active`/`max_active`.
struct ActiveCall<'a>(&'a MockTransport);

impl<'a> ActiveCall<'a> {
    fn enter(transport: &'a MockTransport) -> Self {
        let now = transport.active.fetch_add(1, Ordering::SeqCst) + 1;
        transport.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveCall(transport)
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset the offset a query for (`queue`, `client`) returns.
    pub fn with_offset(self, queue: QueueRef, client: &ClientIdentity, offset: Offset) -> Self {
        self.set_offset(queue, client, offset);
        self
    }

    /// Script the behavior of every call against `broker_name`.
    pub fn with_behavior(self, broker_name: impl Into<String>, behavior: MockBehavior) -> Self {
        self.set_behavior(broker_name, behavior);
        self
    }

    pub fn set_offset(&self, queue: QueueRef, client: &ClientIdentity, offset: Offset) {
        lock(&self.offsets).insert((queue, client.clone()), offset);
    }

    pub fn set_behavior(&self, broker_name: impl Into<String>, behavior: MockBehavior) {
        lock(&self.behaviors).insert(broker_name.into(), behavior);
    }

    pub fn clear_behavior(&self, broker_name: &str) {
        lock(&self.behaviors).remove(broker_name);
    }

    /// Stored offset for (`queue`, `client`), if any commit reached it.
    pub fn stored_offset(&self, queue: &QueueRef, client: &ClientIdentity) -> Option<Offset> {
        lock(&self.offsets)
            .get(&(queue.clone(), client.clone()))
            .copied()
    }

    /// Every commit call received, in arrival order.
    pub fn commit_calls(&self) -> Vec<CommitCall> {
        lock(&self.commits).clone()
    }

    /// Every query call received, in arrival order.
    pub fn query_calls(&self) -> Vec<QueryCall> {
        lock(&self.queries).clone()
    }

    /// Highest number of calls that were executing at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Apply the scripted behavior for `broker_name`.
    fn scripted(&self, broker_name: &str) -> Result<(), RemoteCallError> {
        let behavior = {
            let mut behaviors = lock(&self.behaviors);
            match behaviors.get_mut(broker_name) {
                Some(MockBehavior::FailTimes(remaining, error)) => {
                    if *remaining == 0 {
                        None
                    } else {
                        *remaining -= 1;
                        Some(MockBehavior::Fail(error.clone()))
                    }
                }
                Some(behavior) => Some(behavior.clone()),
                None => None,
            }
        };

        match behavior {
            None | Some(MockBehavior::FailTimes(..)) => Ok(()),
            Some(MockBehavior::Delay(delay)) => {
                std::thread::sleep(delay);
                Ok(())
            }
            Some(MockBehavior::Fail(error)) => Err(error),
            Some(MockBehavior::DelayThenFail(delay, error)) => {
                std::thread::sleep(delay);
                Err(error)
            }
            Some(MockBehavior::Panic) => panic!("scripted transport panic for {}", broker_name),
        }
    }
}

impl OffsetTransport for MockTransport {
    fn commit(
        &self,
        address: &str,
        queue: &QueueRef,
        client: &ClientIdentity,
        offset: Offset,
    ) -> Result<(), RemoteCallError> {
        let _active = ActiveCall::enter(self);
        lock(&self.commits).push(CommitCall {
            address: address.to_string(),
            queue: queue.clone(),
            client: client.clone(),
            offset,
        });

        self.scripted(queue.broker_name())?;
        lock(&self.offsets).insert((queue.clone(), client.clone()), offset);
        Ok(())
    }

    fn query(
        &self,
        address: &str,
        queue: &QueueRef,
        client: &ClientIdentity,
    ) -> Result<Offset, RemoteCallError> {
        let _active = ActiveCall::enter(self);
        lock(&self.queries).push(QueryCall {
            address: address.to_string(),
            queue: queue.clone(),
            client: client.clone(),
        });

        self.scripted(queue.broker_name())?;
        Ok(self
            .stored_offset(queue, client)
            .unwrap_or(Offset::NONE))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
