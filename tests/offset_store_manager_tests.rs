//! Integration tests for OffsetStoreManager.
//!
//! These tests drive save and fetch against a scripted in-memory transport
//! and verify fan-out, partial failure handling, backpressure and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mqtt_offset_store::prelude::*;
use mqtt_offset_store::store::{MockBehavior, MockTransport};
use tokio::task::JoinSet;

const ADDR_A: &str = "127.0.0.1:10911";
const ADDR_B: &str = "127.0.0.2:10911";
const ADDR_C: &str = "127.0.0.3:10911";

type TestManager = OffsetStoreManager<StaticAddressResolver, MockTransport>;

fn client() -> ClientIdentity {
    ClientIdentity::new("gid_test@@@qwewqee").unwrap()
}

fn subscription() -> Subscription {
    Subscription::new("t/t1/t2").unwrap()
}

fn queue(broker: &str) -> QueueRef {
    QueueRef::for_subscription(&subscription(), broker)
}

fn fast_config() -> OffsetStoreConfig {
    OffsetStoreConfig {
        worker_pool_size: 4,
        per_call_timeout: Duration::from_millis(300),
        fetch_barrier_timeout: Duration::from_millis(1_000),
        shutdown_drain_timeout: Duration::from_millis(1_000),
        ..Default::default()
    }
}

fn one_broker() -> StaticAddressResolver {
    StaticAddressResolver::new().with_route("t", "brokerA", ADDR_A)
}

fn three_brokers() -> StaticAddressResolver {
    StaticAddressResolver::new()
        .with_route("t", "brokerA", ADDR_A)
        .with_route("t", "brokerB", ADDR_B)
        .with_route("t", "brokerC", ADDR_C)
}

fn create_manager(
    resolver: StaticAddressResolver,
    transport: &Arc<MockTransport>,
    config: OffsetStoreConfig,
) -> TestManager {
    OffsetStoreManager::with_current_runtime(resolver, Arc::clone(transport), config)
        .expect("Failed to create manager")
}

fn offsets_for(entries: &[(&str, u64)]) -> OffsetMap {
    let queue_offsets: QueueOffsets = entries
        .iter()
        .map(|(broker, offset)| (queue(broker), Offset(*offset)))
        .collect();
    OffsetMap::from([(subscription(), queue_offsets)])
}

// ============================================================================
// Save
// ============================================================================

#[tokio::test]
async fn test_save_commits_single_queue() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 0)]))
        .unwrap();
    manager.wait_idle().await;

    let commits = transport.commit_calls();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].address, ADDR_A);
    assert_eq!(commits[0].queue, QueueRef::new(0, "t/t1/t2", "brokerA"));
    assert_eq!(commits[0].client, client());
    assert_eq!(commits[0].offset, Offset(0));
}

#[tokio::test]
async fn test_save_returns_before_slow_commits_finish() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(500))),
    );
    let manager = create_manager(one_broker(), &transport, OffsetStoreConfig::default());

    let started = Instant::now();
    manager
        .save(&client(), &offsets_for(&[("brokerA", 12)]))
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(manager.pending_tasks(), 1);

    manager.wait_idle().await;
    assert_eq!(
        transport.stored_offset(&queue("brokerA"), &client()),
        Some(Offset(12))
    );
}

#[tokio::test]
async fn test_save_skips_brokers_without_offsets() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(three_brokers(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerB", 7)]))
        .unwrap();
    manager.wait_idle().await;

    let commits = transport.commit_calls();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].address, ADDR_B);
    assert_eq!(commits[0].offset, Offset(7));
}

#[tokio::test]
async fn test_save_ignores_offsets_for_unresolved_brokers() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 1), ("gone", 2)]))
        .unwrap();
    manager.wait_idle().await;

    let commits = transport.commit_calls();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].queue.broker_name(), "brokerA");
}

#[tokio::test]
async fn test_save_with_empty_resolution_is_noop() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(StaticAddressResolver::new(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 3)]))
        .unwrap();

    assert_eq!(manager.pending_tasks(), 0);
    assert!(transport.commit_calls().is_empty());
}

#[tokio::test]
async fn test_save_with_empty_queue_offsets_is_noop() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    let offsets = OffsetMap::from([(subscription(), QueueOffsets::new())]);
    manager.save(&client(), &offsets).unwrap();

    assert_eq!(manager.pending_tasks(), 0);
    assert!(transport.commit_calls().is_empty());
}

#[tokio::test]
async fn test_save_rejects_queue_from_other_subscription() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    let offsets = OffsetMap::from([(
        subscription(),
        HashMap::from([
            (queue("brokerA"), Offset(1)),
            (QueueRef::new(0, "t/other", "brokerA"), Offset(2)),
        ]),
    )]);

    let result = manager.save(&client(), &offsets);
    assert!(matches!(
        result,
        Err(OffsetStoreError::QueueTopicMismatch { .. })
    ));

    // Nothing is dispatched when the map is rejected
    manager.wait_idle().await;
    assert!(transport.commit_calls().is_empty());
}

#[tokio::test]
async fn test_save_rejects_underived_shard_index() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    let offsets = OffsetMap::from([(
        subscription(),
        HashMap::from([(QueueRef::new(1, "t/t1/t2", "brokerA"), Offset(5))]),
    )]);

    match manager.save(&client(), &offsets) {
        Err(OffsetStoreError::QueueTopicMismatch { queue, .. }) => {
            assert_eq!(queue, "t/t1/t2:1@brokerA");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    manager.wait_idle().await;
    assert!(transport.commit_calls().is_empty());
}

#[tokio::test]
async fn test_failed_commit_does_not_affect_siblings() {
    let transport = Arc::new(MockTransport::new().with_behavior(
        "brokerB",
        MockBehavior::Fail(RemoteCallError::Connection("refused".into())),
    ));
    let manager = create_manager(three_brokers(), &transport, fast_config());

    manager
        .save(
            &client(),
            &offsets_for(&[("brokerA", 1), ("brokerB", 2), ("brokerC", 3)]),
        )
        .unwrap();
    manager.wait_idle().await;

    assert_eq!(transport.commit_calls().len(), 3);
    assert_eq!(
        transport.stored_offset(&queue("brokerA"), &client()),
        Some(Offset(1))
    );
    assert_eq!(transport.stored_offset(&queue("brokerB"), &client()), None);
    assert_eq!(
        transport.stored_offset(&queue("brokerC"), &client()),
        Some(Offset(3))
    );
}

#[tokio::test]
async fn test_save_multiple_subscriptions() {
    let transport = Arc::new(MockTransport::new());
    let resolver = one_broker().with_route("sensors", "brokerS", "10.0.0.9:10911");
    let manager = create_manager(resolver, &transport, fast_config());

    let sensors = Subscription::new("sensors/+/temp").unwrap();
    let mut offsets = offsets_for(&[("brokerA", 4)]);
    offsets.insert(
        sensors.clone(),
        HashMap::from([(QueueRef::for_subscription(&sensors, "brokerS"), Offset(9))]),
    );

    manager.save(&client(), &offsets).unwrap();
    manager.wait_idle().await;

    assert_eq!(transport.commit_calls().len(), 2);
    assert_eq!(
        transport.stored_offset(&QueueRef::new(0, "sensors/+/temp", "brokerS"), &client()),
        Some(Offset(9))
    );
}

// ============================================================================
// Fetch
// ============================================================================

#[tokio::test]
async fn test_fetch_returns_queried_offset() {
    let transport = Arc::new(MockTransport::new().with_offset(
        QueueRef::new(0, "t/t1/t2", "brokerA"),
        &client(),
        Offset(10),
    ));
    let manager = create_manager(one_broker(), &transport, fast_config());

    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;

    assert_eq!(
        offsets,
        HashMap::from([(QueueRef::new(0, "t/t1/t2", "brokerA"), Offset(10))])
    );

    let queries = transport.query_calls();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].address, ADDR_A);
}

#[tokio::test]
async fn test_fetch_timeout_on_one_broker_uses_sentinel() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_secs(1)))
            .with_offset(queue("brokerB"), &client(), Offset(5)),
    );
    let resolver = one_broker().with_route("t", "brokerB", ADDR_B);
    let manager = create_manager(resolver, &transport, fast_config());

    let started = Instant::now();
    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;

    assert!(started.elapsed() < fast_config().fetch_barrier_timeout);
    assert_eq!(offsets.len(), 2);
    assert_eq!(offsets[&queue("brokerA")], Offset::NONE);
    assert_eq!(offsets[&queue("brokerB")], Offset(5));
}

#[tokio::test]
async fn test_fetch_covers_every_derived_queue_despite_failures() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior(
                "brokerA",
                MockBehavior::Fail(RemoteCallError::Rejected {
                    code: 17,
                    message: "no such group".into(),
                }),
            )
            .with_behavior("brokerB", MockBehavior::Panic)
            .with_offset(queue("brokerC"), &client(), Offset(33)),
    );
    let manager = create_manager(three_brokers(), &transport, fast_config());

    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;

    let mut keys: Vec<_> = offsets.keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![queue("brokerA"), queue("brokerB"), queue("brokerC")]
    );
    assert_eq!(offsets[&queue("brokerA")], Offset::NONE);
    assert_eq!(offsets[&queue("brokerB")], Offset::NONE);
    assert_eq!(offsets[&queue("brokerC")], Offset(33));
}

#[tokio::test]
async fn test_fetch_with_empty_resolution_is_empty() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(StaticAddressResolver::new(), &transport, fast_config());

    let fetch = manager.fetch_offsets(&client(), &subscription()).unwrap();
    assert!(fetch.is_finished());
    assert!(fetch.await.is_empty());
    assert!(transport.query_calls().is_empty());
}

#[tokio::test]
async fn test_fetch_barrier_timeout_reports_pending_queues_as_sentinel() {
    // One worker: the second query waits for the first and misses the barrier.
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(300)))
            .with_behavior("brokerB", MockBehavior::Delay(Duration::from_millis(300)))
            .with_offset(queue("brokerA"), &client(), Offset(7))
            .with_offset(queue("brokerB"), &client(), Offset(7)),
    );
    let config = OffsetStoreConfig {
        worker_pool_size: 1,
        per_call_timeout: Duration::from_millis(400),
        fetch_barrier_timeout: Duration::from_millis(450),
        ..fast_config()
    };
    let resolver = one_broker().with_route("t", "brokerB", ADDR_B);
    let manager = create_manager(resolver, &transport, config);

    let started = Instant::now();
    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;

    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(offsets.len(), 2);
    assert_eq!(offsets.values().filter(|o| **o == Offset(7)).count(), 1);
    assert_eq!(offsets.values().filter(|o| o.is_none()).count(), 1);
}

#[tokio::test]
async fn test_fetch_after_save_sees_committed_offset() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 42)]))
        .unwrap();
    manager.wait_idle().await;

    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;
    assert_eq!(offsets[&queue("brokerA")], Offset(42));
}

#[tokio::test]
async fn test_fetch_shared_subscription_uses_plain_queue_name() {
    let shared = Subscription::new("$share/g1/t/t1/t2").unwrap();
    let transport = Arc::new(MockTransport::new().with_offset(
        queue("brokerA"),
        &client(),
        Offset(8),
    ));
    let manager = create_manager(one_broker(), &transport, fast_config());

    let offsets = manager.fetch_offsets(&client(), &shared).unwrap().await;
    assert_eq!(offsets[&QueueRef::new(0, "t/t1/t2", "brokerA")], Offset(8));
}

#[tokio::test]
async fn test_dropped_fetch_handle_still_completes() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(100))),
    );
    let manager = create_manager(one_broker(), &transport, fast_config());

    drop(manager.fetch_offsets(&client(), &subscription()).unwrap());
    manager.wait_idle().await;

    assert_eq!(transport.query_calls().len(), 1);
    assert_eq!(manager.pending_tasks(), 0);
}

// ============================================================================
// Concurrency and backpressure
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_pool_queues_calls_instead_of_dropping() {
    let mut resolver = StaticAddressResolver::new();
    let transport = Arc::new(MockTransport::new());
    for i in 0..6 {
        let broker = format!("broker{i}");
        resolver = resolver.with_route("t", broker.as_str(), format!("10.0.0.{i}:10911"));
        transport.set_behavior(broker.as_str(), MockBehavior::Delay(Duration::from_millis(50)));
        transport.set_offset(queue(&broker), &client(), Offset(100 + i as u64));
    }

    let config = OffsetStoreConfig {
        worker_pool_size: 2,
        per_call_timeout: Duration::from_secs(1),
        fetch_barrier_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let manager = create_manager(resolver, &transport, config);

    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;

    assert_eq!(offsets.len(), 6);
    assert!(offsets.values().all(|o| o.value() >= 100));
    assert!(transport.max_concurrent_calls() <= 2);
}

#[tokio::test]
async fn test_queued_commits_abandoned_after_per_call_timeout() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(600))),
    );
    let config = OffsetStoreConfig {
        worker_pool_size: 1,
        per_call_timeout: Duration::from_millis(100),
        fetch_barrier_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let manager = create_manager(one_broker(), &transport, config);

    for offset in 1..=3 {
        manager
            .save(&client(), &offsets_for(&[("brokerA", offset)]))
            .unwrap();
    }
    assert_eq!(manager.pending_tasks(), 3);

    // The first commit holds the only worker; the others give up waiting
    tokio::time::timeout(Duration::from_millis(400), manager.wait_idle())
        .await
        .expect("queued commits should be abandoned");
    assert_eq!(manager.pending_tasks(), 0);
    assert_eq!(transport.commit_calls().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_from_many_clients() {
    let transport = Arc::new(MockTransport::new());
    let manager = Arc::new(create_manager(three_brokers(), &transport, fast_config()));

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let manager = Arc::clone(&manager);
        let client = ClientIdentity::new(format!("gid@@@conn-{i}")).unwrap();
        tasks.spawn(async move {
            manager
                .fetch_offsets(&client, &subscription())
                .unwrap()
                .await
        });
    }

    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        let offsets = result.expect("fetch task panicked");
        assert_eq!(offsets.len(), 3);
        completed += 1;
    }
    assert_eq!(completed, 20);
    assert_eq!(transport.query_calls().len(), 60);
    assert!(transport.max_concurrent_calls() <= fast_config().worker_pool_size);
}

// ============================================================================
// Commit retry
// ============================================================================

#[tokio::test]
async fn test_commit_not_retried_by_default() {
    let transport = Arc::new(MockTransport::new().with_behavior(
        "brokerA",
        MockBehavior::FailTimes(1, RemoteCallError::Connection("reset".into())),
    ));
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 5)]))
        .unwrap();
    manager.wait_idle().await;

    assert_eq!(transport.commit_calls().len(), 1);
    assert_eq!(transport.stored_offset(&queue("brokerA"), &client()), None);
}

#[tokio::test]
async fn test_commit_retry_recovers_transient_failures() {
    let transport = Arc::new(MockTransport::new().with_behavior(
        "brokerA",
        MockBehavior::FailTimes(2, RemoteCallError::Connection("reset".into())),
    ));
    let config = OffsetStoreConfig {
        commit_retry: CommitRetry::Exponential {
            max_retries: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        },
        ..fast_config()
    };
    let manager = create_manager(one_broker(), &transport, config);

    manager
        .save(&client(), &offsets_for(&[("brokerA", 5)]))
        .unwrap();
    manager.wait_idle().await;

    assert_eq!(transport.commit_calls().len(), 3);
    assert_eq!(
        transport.stored_offset(&queue("brokerA"), &client()),
        Some(Offset(5))
    );
}

#[tokio::test]
async fn test_commit_retry_skips_rejections() {
    let transport = Arc::new(MockTransport::new().with_behavior(
        "brokerA",
        MockBehavior::Fail(RemoteCallError::Rejected {
            code: 1,
            message: "denied".into(),
        }),
    ));
    let config = OffsetStoreConfig {
        commit_retry: CommitRetry::Exponential {
            max_retries: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        },
        ..fast_config()
    };
    let manager = create_manager(one_broker(), &transport, config);

    manager
        .save(&client(), &offsets_for(&[("brokerA", 5)]))
        .unwrap();
    manager.wait_idle().await;

    assert_eq!(transport.commit_calls().len(), 1);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_rejects_new_work() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager.shutdown().await;
    assert!(manager.is_shut_down());

    assert!(matches!(
        manager.save(&client(), &offsets_for(&[("brokerA", 1)])),
        Err(OffsetStoreError::ShutDown)
    ));
    assert!(matches!(
        manager.fetch_offsets(&client(), &subscription()),
        Err(OffsetStoreError::ShutDown)
    ));
    assert!(transport.commit_calls().is_empty());
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let transport = Arc::new(MockTransport::new());
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager.shutdown().await;
    manager.shutdown().await;
    assert_eq!(manager.pending_tasks(), 0);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_commits() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(100))),
    );
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 21)]))
        .unwrap();
    manager.shutdown().await;

    assert_eq!(manager.pending_tasks(), 0);
    assert_eq!(
        transport.stored_offset(&queue("brokerA"), &client()),
        Some(Offset(21))
    );
}

#[tokio::test]
async fn test_shutdown_cancels_after_drain_window() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(800))),
    );
    let config = OffsetStoreConfig {
        per_call_timeout: Duration::from_secs(1),
        fetch_barrier_timeout: Duration::from_secs(2),
        shutdown_drain_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let manager = create_manager(one_broker(), &transport, config);

    manager
        .save(&client(), &offsets_for(&[("brokerA", 3)]))
        .unwrap();

    let started = Instant::now();
    manager.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(600));
    assert_eq!(manager.pending_tasks(), 0);
}

#[tokio::test]
async fn test_shutdown_resolves_pending_fetch_with_sentinel() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(800)))
            .with_offset(queue("brokerA"), &client(), Offset(9)),
    );
    let config = OffsetStoreConfig {
        per_call_timeout: Duration::from_secs(1),
        fetch_barrier_timeout: Duration::from_secs(2),
        shutdown_drain_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let manager = create_manager(one_broker(), &transport, config);

    let fetch = manager.fetch_offsets(&client(), &subscription()).unwrap();
    manager.shutdown().await;

    let offsets = fetch.await;
    assert_eq!(offsets, HashMap::from([(queue("brokerA"), Offset::NONE)]));
}

#[tokio::test]
async fn test_no_transport_references_leak_past_shutdown() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(200))),
    );
    let baseline = Arc::strong_count(&transport);
    let config = OffsetStoreConfig {
        shutdown_drain_timeout: Duration::from_millis(20),
        ..fast_config()
    };
    let manager = create_manager(one_broker(), &transport, config);
    let with_manager = Arc::strong_count(&transport);
    assert_eq!(with_manager, baseline + 1);

    manager
        .save(&client(), &offsets_for(&[("brokerA", 1)]))
        .unwrap();
    let _ = manager.fetch_offsets(&client(), &subscription()).unwrap();
    manager.shutdown().await;
    assert_eq!(manager.pending_tasks(), 0);

    // Abandoned blocking calls release their references once they return
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(Arc::strong_count(&transport), with_manager);

    drop(manager);
    assert_eq!(Arc::strong_count(&transport), baseline);
}

#[tokio::test]
async fn test_dropping_manager_lets_in_flight_commits_finish() {
    let transport = Arc::new(
        MockTransport::new()
            .with_behavior("brokerA", MockBehavior::Delay(Duration::from_millis(50))),
    );
    let manager = create_manager(one_broker(), &transport, fast_config());

    manager
        .save(&client(), &offsets_for(&[("brokerA", 77)]))
        .unwrap();
    drop(manager);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        transport.stored_offset(&queue("brokerA"), &client()),
        Some(Offset(77))
    );
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test]
async fn test_manager_accepts_trait_objects() {
    let transport: Arc<dyn OffsetTransport> = Arc::new(MockTransport::new());
    let resolver: Arc<dyn AddressResolver> = Arc::new(one_broker());
    let manager =
        OffsetStoreManager::with_current_runtime(resolver, transport, fast_config()).unwrap();

    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;
    assert_eq!(offsets, HashMap::from([(queue("brokerA"), Offset::NONE)]));
}

#[tokio::test]
async fn test_manager_with_caching_resolver() {
    let transport = Arc::new(MockTransport::new());
    let resolver = CachingAddressResolver::new(one_broker(), Duration::from_secs(60), 1_000);
    let manager =
        OffsetStoreManager::with_current_runtime(resolver, Arc::clone(&transport), fast_config())
            .unwrap();

    for offset in 1..=3 {
        manager
            .save(&client(), &offsets_for(&[("brokerA", offset)]))
            .unwrap();
        manager.wait_idle().await;
    }

    // Routes removed from the backing table stay visible until invalidated
    manager.resolver().inner().remove_topic("t");
    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;
    assert_eq!(offsets[&queue("brokerA")], Offset(3));

    manager.resolver().invalidate("t");
    let offsets = manager
        .fetch_offsets(&client(), &subscription())
        .unwrap()
        .await;
    assert!(offsets.is_empty());
}
