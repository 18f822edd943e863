//! Prometheus metrics for the offset store.
//!
//! Degraded fetch results are indistinguishable from real offsets in the
//! returned map, so these metrics (together with the logs) are where
//! partial failures become visible:
//! - Remote calls per operation and outcome, with latency
//! - Fetch fallbacks to the sentinel offset, per reason
//! - Barrier timeouts and empty broker resolutions
//! - In-flight dispatch tasks
//!
//! # Safety
//!
//! All metrics live in a custom registry prefixed `mqtt_offset_store`.
//! Registration failures fall back to an unregistered metric with a
//! warning instead of panicking.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder, opts,
};
use tracing::warn;

/// Custom Prometheus registry for offset store metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("mqtt_offset_store".to_string()), None)
        .unwrap_or_else(|_| Registry::new())
});

/// Declare an IntCounterVec metric with labels.
macro_rules! define_counter_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounterVec> = Lazy::new(|| {
            register_int_counter_vec_safe(&REGISTRY, $metric_name, $help, &[$($label),+])
        });
    };
}

/// Declare an IntCounter metric (no labels).
macro_rules! define_counter {
    ($name:ident, $metric_name:expr, $help:expr) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounter> =
            Lazy::new(|| register_int_counter_safe(&REGISTRY, $metric_name, $help));
    };
}

define_counter_vec!(
    REMOTE_CALLS,
    "remote_calls_total",
    "Remote offset calls by operation and outcome",
    ["op", "status"]
);

pub static REMOTE_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec_safe(
        &REGISTRY,
        "remote_call_duration_seconds",
        "Latency of remote offset calls",
        &["op"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 3.0, 10.0],
    )
});

define_counter_vec!(
    FETCH_FALLBACKS,
    "fetch_fallbacks_total",
    "Queues reported with the sentinel offset because their query did not succeed",
    ["reason"]
);

define_counter!(
    FETCH_BARRIER_TIMEOUTS,
    "fetch_barrier_timeouts_total",
    "Fetches that hit the barrier timeout with queries still pending"
);

define_counter_vec!(
    EMPTY_RESOLUTIONS,
    "empty_resolutions_total",
    "Operations skipped because no broker hosts the topic",
    ["op"]
);

define_counter_vec!(
    COMMIT_RETRIES,
    "commit_retries_total",
    "Commit retry events",
    ["status"]
);

pub static INFLIGHT_TASKS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge_safe(
        &REGISTRY,
        "inflight_tasks",
        "Dispatch tasks submitted and not yet finished",
    )
});

fn register_int_gauge_safe(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(gauge.clone())) {
        Ok(()) => gauge,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntGauge metric, using unregistered fallback");
            gauge
        }
    }
}

fn register_int_counter_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntCounterVec {
    let counter =
        IntCounterVec::new(opts!(name, help), labels).expect("metric opts should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntCounterVec metric, using unregistered fallback");
            counter
        }
    }
}

fn register_int_counter_safe(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntCounter metric, using unregistered fallback");
            counter
        }
    }
}

fn register_histogram_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> HistogramVec {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
        .expect("metric opts should be valid");
    match registry.register(Box::new(histogram.clone())) {
        Ok(()) => histogram,
        Err(e) => {
            warn!(name, error = %e, "Failed to register HistogramVec metric, using unregistered fallback");
            histogram
        }
    }
}

/// Force registration of every metric so they appear before first use.
pub fn init_metrics() {
    Lazy::force(&REMOTE_CALLS);
    Lazy::force(&REMOTE_CALL_DURATION);
    Lazy::force(&FETCH_FALLBACKS);
    Lazy::force(&FETCH_BARRIER_TIMEOUTS);
    Lazy::force(&EMPTY_RESOLUTIONS);
    Lazy::force(&COMMIT_RETRIES);
    Lazy::force(&INFLIGHT_TASKS);
}

/// Render all metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record the outcome and latency of one remote call.
pub fn record_remote_call(op: &str, status: &str, duration_secs: f64) {
    REMOTE_CALLS.with_label_values(&[op, status]).inc();
    REMOTE_CALL_DURATION
        .with_label_values(&[op])
        .observe(duration_secs);
}

/// Record a queue that fell back to the sentinel offset.
pub fn record_fetch_fallback(reason: &str) {
    FETCH_FALLBACKS.with_label_values(&[reason]).inc();
}

/// Record a fetch that hit its barrier timeout.
pub fn record_barrier_timeout() {
    FETCH_BARRIER_TIMEOUTS.inc();
}

/// Record a save or fetch whose topic resolved to no brokers.
pub fn record_empty_resolution(op: &str) {
    EMPTY_RESOLUTIONS.with_label_values(&[op]).inc();
}

/// Record a commit retry event (`attempt` or `exhausted`).
pub fn record_commit_retry(status: &str) {
    COMMIT_RETRIES.with_label_values(&[status]).inc();
}
