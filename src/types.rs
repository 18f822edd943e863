//! Value types exchanged with callers of the offset store.
//!
//! Every type here is immutable once built and cheap to clone: string data
//! is held in `Arc<str>` so queue keys can be copied into many concurrent
//! remote calls without reallocating.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BROKER_TOPIC_SEPARATOR, CLIENT_ID_DELIMITER, LMQ_PREFIX, LMQ_QUEUE_ID, MULTI_LEVEL_WILDCARD,
    NO_COMMITTED_OFFSET, SHARED_SUBSCRIPTION_PREFIX, SINGLE_LEVEL_WILDCARD, TOPIC_LEVEL_SEPARATOR,
};
use crate::store::{OffsetStoreError, OffsetStoreResult};

/// Broker name to network address, as returned by an
/// [`AddressResolver`](crate::store::AddressResolver).
pub type BrokerAddressMap = HashMap<String, String>;

/// Committed offsets for the queue shards of one subscription.
pub type QueueOffsets = HashMap<QueueRef, Offset>;

/// Committed offsets per subscription: the unit exchanged with callers.
pub type OffsetMap = HashMap<Subscription, QueueOffsets>;

/// The next position to consume on a queue shard.
///
/// # Sentinel
///
/// [`Offset::NONE`] (value `0`) means "no committed offset yet". It is also
/// what a fetch reports for shards whose broker could not be reached, so
/// callers must read it as "start from the beginning".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Offset(pub u64);

impl Offset {
    /// No committed offset; consume from the beginning.
    pub const NONE: Self = Offset(NO_COMMITTED_OFFSET);

    /// Create a new offset from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Offset(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Convert a signed offset reported by a broker.
    ///
    /// Brokers answer `-1` for queues they have never seen a commit for;
    /// every negative value maps to [`Offset::NONE`].
    #[inline]
    pub const fn from_remote(value: i64) -> Self {
        if value < 0 {
            Offset::NONE
        } else {
            Offset(value as u64)
        }
    }

    /// Value as sent to a broker.
    #[inline]
    pub fn to_remote(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Check whether this is the "no committed offset" sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == NO_COMMITTED_OFFSET
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Offset(value)
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one consuming MQTT session.
///
/// Conventionally `{group_id}@@@{connection_id}`. The store passes it
/// through to transport calls untouched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct ClientIdentity(Arc<str>);

impl ClientIdentity {
    /// Create a client identity, rejecting the empty string.
    pub fn new(value: impl AsRef<str>) -> OffsetStoreResult<Self> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(OffsetStoreError::InvalidClientIdentity);
        }
        Ok(ClientIdentity(Arc::from(value)))
    }

    /// The raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Group part of the identity, when the conventional delimiter is present.
    pub fn group_id(&self) -> Option<&str> {
        self.0
            .split_once(CLIENT_ID_DELIMITER)
            .map(|(group, _)| group)
            .filter(|group| !group.is_empty())
    }

    /// Consumer group name the brokers track this client's offsets under.
    pub fn consumer_group(&self) -> String {
        format!("{}{}", LMQ_PREFIX, self.0)
    }
}

impl TryFrom<String> for ClientIdentity {
    type Error = OffsetStoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ClientIdentity::new(value)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An MQTT topic filter a client subscribed to.
///
/// Equality and hashing use the normalized filter plus the share group, so
/// `$share/g/a/b` and `a/b` are distinct subscriptions backed by the same
/// queue name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSubscription")]
pub struct Subscription {
    filter: Arc<str>,
    share_group: Option<Arc<str>>,
}

impl Subscription {
    /// Parse and validate a topic filter.
    ///
    /// # Errors
    ///
    /// Returns [`OffsetStoreError::InvalidSubscription`] when the filter is
    /// empty, uses a wildcard inside a level, places `#` anywhere but the
    /// last level, or starts with a wildcard or empty level (the first level
    /// keys broker routing and must be concrete).
    pub fn new(topic_filter: impl AsRef<str>) -> OffsetStoreResult<Self> {
        let raw = topic_filter.as_ref();
        let invalid = |reason: &str| OffsetStoreError::InvalidSubscription {
            filter: raw.to_string(),
            reason: reason.to_string(),
        };

        let (share_group, filter) = match raw.strip_prefix(SHARED_SUBSCRIPTION_PREFIX) {
            Some(rest) => match rest.split_once(TOPIC_LEVEL_SEPARATOR) {
                Some((group, filter)) if !group.is_empty() => (Some(Arc::from(group)), filter),
                _ => return Err(invalid("shared subscription needs a group and a filter")),
            },
            None => (None, raw),
        };

        if filter.is_empty() {
            return Err(invalid("topic filter is empty"));
        }

        let levels: Vec<&str> = filter.split(TOPIC_LEVEL_SEPARATOR).collect();
        let last = levels.len() - 1;
        for (i, level) in levels.iter().enumerate() {
            if level.contains(MULTI_LEVEL_WILDCARD) {
                if *level != MULTI_LEVEL_WILDCARD || i != last {
                    return Err(invalid("'#' must occupy the whole last level"));
                }
            } else if level.contains(SINGLE_LEVEL_WILDCARD) && *level != SINGLE_LEVEL_WILDCARD {
                return Err(invalid("'+' must occupy a whole level"));
            }
        }

        let first = levels[0];
        if first.is_empty() || first == SINGLE_LEVEL_WILDCARD || first == MULTI_LEVEL_WILDCARD {
            return Err(invalid("first level must be a concrete topic"));
        }

        Ok(Subscription {
            filter: Arc::from(filter),
            share_group,
        })
    }

    /// The topic filter without any shared-subscription prefix.
    pub fn topic_filter(&self) -> &str {
        &self.filter
    }

    /// Share group for `$share/` subscriptions.
    pub fn share_group(&self) -> Option<&str> {
        self.share_group.as_deref()
    }

    /// Whether the filter contains MQTT wildcards.
    pub fn is_wildcard(&self) -> bool {
        self.filter
            .split(TOPIC_LEVEL_SEPARATOR)
            .any(|level| level == SINGLE_LEVEL_WILDCARD || level == MULTI_LEVEL_WILDCARD)
    }

    /// The first level of the filter, used to resolve the hosting brokers.
    pub fn first_topic(&self) -> &str {
        self.filter
            .split(TOPIC_LEVEL_SEPARATOR)
            .next()
            .unwrap_or(&self.filter)
    }

    /// Name of the queue backing this subscription on every broker.
    pub fn queue_name(&self) -> &str {
        &self.filter
    }
}

/// Serialized form of a [`Subscription`], validated on the way in.
#[derive(Deserialize)]
struct RawSubscription {
    filter: String,
    share_group: Option<String>,
}

impl TryFrom<RawSubscription> for Subscription {
    type Error = OffsetStoreError;

    fn try_from(raw: RawSubscription) -> Result<Self, Self::Error> {
        let full = match &raw.share_group {
            Some(group) => format!("{}{}/{}", SHARED_SUBSCRIPTION_PREFIX, group, raw.filter),
            None => raw.filter.clone(),
        };
        let subscription = Subscription::new(&full)?;

        // A group or filter that reparses differently (a '/' in the group,
        // a '$share/' filter without a group) is not a valid pair.
        if subscription.topic_filter() != raw.filter
            || subscription.share_group() != raw.share_group.as_deref()
        {
            return Err(OffsetStoreError::InvalidSubscription {
                filter: full,
                reason: "share group and filter do not form a subscription".to_string(),
            });
        }
        Ok(subscription)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.share_group {
            Some(group) => write!(f, "{}{}/{}", SHARED_SUBSCRIPTION_PREFIX, group, self.filter),
            None => f.write_str(&self.filter),
        }
    }
}

/// One shard of a subscription queue hosted by one broker.
///
/// Two refs are equal iff shard index, topic and broker name all match; it
/// is the join key between offsets to persist and offsets fetched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueRef {
    shard_index: u32,
    topic: Arc<str>,
    broker_name: Arc<str>,
}

impl QueueRef {
    pub fn new(shard_index: u32, topic: impl Into<Arc<str>>, broker_name: impl Into<Arc<str>>) -> Self {
        QueueRef {
            shard_index,
            topic: topic.into(),
            broker_name: broker_name.into(),
        }
    }

    /// The shard of `subscription` that lives on `broker_name`.
    pub fn for_subscription(subscription: &Subscription, broker_name: &str) -> Self {
        QueueRef::new(LMQ_QUEUE_ID, subscription.queue_name(), broker_name)
    }

    pub fn shard_index(&self) -> u32 {
        self.shard_index
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn broker_name(&self) -> &str {
        &self.broker_name
    }

    /// Topic name of this queue on the broker (`%LMQ%a%b` for `a/b`).
    pub fn broker_topic(&self) -> String {
        let mut name = String::with_capacity(LMQ_PREFIX.len() + self.topic.len());
        name.push_str(LMQ_PREFIX);
        name.extend(self.topic.chars().map(|c| {
            if c == TOPIC_LEVEL_SEPARATOR {
                BROKER_TOPIC_SEPARATOR
            } else {
                c
            }
        }));
        name
    }
}

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.topic, self.shard_index, self.broker_name)
    }
}
