//! Integration tests for OffsetStoreConfig::from_env()
//!
//! These tests verify configuration loading from environment variables.

use std::env;
use std::sync::Mutex;
use std::time::Duration;

use mqtt_offset_store::store::{CommitRetry, OffsetStoreConfig, OffsetStoreError};

/// Global mutex to serialize all env-based tests.
/// Environment variables are process-global, so we must prevent concurrent access.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// All environment variables read by OffsetStoreConfig::from_env().
const ALL_CONFIG_ENV_VARS: &[&str] = &[
    "OFFSET_WORKER_POOL_SIZE",
    "OFFSET_PER_CALL_TIMEOUT_MS",
    "OFFSET_FETCH_BARRIER_TIMEOUT_MS",
    "OFFSET_COMMIT_MAX_RETRIES",
    "OFFSET_SHUTDOWN_DRAIN_TIMEOUT_MS",
];

/// Run `f` with exactly `vars` set among the config variables, restoring
/// the previous values afterwards.
fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let all_originals: Vec<_> = ALL_CONFIG_ENV_VARS
        .iter()
        .map(|k| (*k, env::var(*k).ok()))
        .collect();

    for key in ALL_CONFIG_ENV_VARS {
        unsafe { env::remove_var(key) };
    }

    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    for (key, original) in all_originals {
        match original {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
    }

    result
}

#[test]
fn test_from_env_defaults() {
    with_env_vars(&[], || {
        let config = OffsetStoreConfig::from_env().expect("Should parse config");
        let defaults = OffsetStoreConfig::default();
        assert_eq!(config.worker_pool_size, defaults.worker_pool_size);
        assert_eq!(config.per_call_timeout, Duration::from_millis(3_000));
        assert_eq!(config.fetch_barrier_timeout, Duration::from_millis(5_000));
        assert_eq!(config.commit_retry, CommitRetry::Disabled);
        assert_eq!(config.shutdown_drain_timeout, Duration::from_millis(5_000));
    });
}

#[test]
fn test_from_env_overrides() {
    with_env_vars(
        &[
            ("OFFSET_WORKER_POOL_SIZE", "8"),
            ("OFFSET_PER_CALL_TIMEOUT_MS", "250"),
            ("OFFSET_FETCH_BARRIER_TIMEOUT_MS", "1000"),
            ("OFFSET_SHUTDOWN_DRAIN_TIMEOUT_MS", "750"),
        ],
        || {
            let config = OffsetStoreConfig::from_env().expect("Should parse config");
            assert_eq!(config.worker_pool_size, 8);
            assert_eq!(config.per_call_timeout, Duration::from_millis(250));
            assert_eq!(config.fetch_barrier_timeout, Duration::from_millis(1_000));
            assert_eq!(config.shutdown_drain_timeout, Duration::from_millis(750));
        },
    );
}

#[test]
fn test_from_env_commit_retries() {
    with_env_vars(&[("OFFSET_COMMIT_MAX_RETRIES", "3")], || {
        let config = OffsetStoreConfig::from_env().expect("Should parse config");
        assert!(matches!(
            config.commit_retry,
            CommitRetry::Exponential { max_retries: 3, .. }
        ));
    });

    with_env_vars(&[("OFFSET_COMMIT_MAX_RETRIES", "0")], || {
        let config = OffsetStoreConfig::from_env().expect("Should parse config");
        assert_eq!(config.commit_retry, CommitRetry::Disabled);
    });
}

#[test]
fn test_from_env_trims_whitespace() {
    with_env_vars(&[("OFFSET_WORKER_POOL_SIZE", " 16 ")], || {
        let config = OffsetStoreConfig::from_env().expect("Should parse config");
        assert_eq!(config.worker_pool_size, 16);
    });
}

#[test]
fn test_from_env_rejects_unparsable_value() {
    with_env_vars(&[("OFFSET_PER_CALL_TIMEOUT_MS", "soon")], || {
        let err = OffsetStoreConfig::from_env().unwrap_err();
        assert!(matches!(err, OffsetStoreError::Config(_)));
        assert!(err.to_string().contains("OFFSET_PER_CALL_TIMEOUT_MS"));
    });
}

#[test]
fn test_from_env_rejects_invalid_combination() {
    with_env_vars(
        &[
            ("OFFSET_PER_CALL_TIMEOUT_MS", "9000"),
            ("OFFSET_FETCH_BARRIER_TIMEOUT_MS", "1000"),
        ],
        || {
            let err = OffsetStoreConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("must not exceed"));
        },
    );
}

#[test]
fn test_from_env_rejects_zero_pool() {
    with_env_vars(&[("OFFSET_WORKER_POOL_SIZE", "0")], || {
        let err = OffsetStoreConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("worker_pool_size"));
    });
}
