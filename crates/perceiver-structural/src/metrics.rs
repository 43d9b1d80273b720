//! Telemetry helpers for the structural perceiver.
//!
//! Lightweight counters + latency aggregates, readable through [`snapshot`] without an external
//! metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

static TREE_TOTAL: AtomicU64 = AtomicU64::new(0);
static TREE_EMPTY: AtomicU64 = AtomicU64::new(0);
static TREE_NODES: AtomicU64 = AtomicU64::new(0);
static TREE_LAT_NS: AtomicU64 = AtomicU64::new(0);
static TREE_LAT_SAMPLES: AtomicU64 = AtomicU64::new(0);

static CORRELATION_TOTAL: AtomicU64 = AtomicU64::new(0);
static CORRELATION_ROUND_TRIPS: AtomicU64 = AtomicU64::new(0);
static CORRELATION_LAT_NS: AtomicU64 = AtomicU64::new(0);
static CORRELATION_LAT_SAMPLES: AtomicU64 = AtomicU64::new(0);

static ROLE_LOOKUPS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricCounter {
    pub total: u64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricSnapshot {
    pub tree: MetricCounter,
    pub empty_trees: u64,
    pub tree_nodes: u64,
    pub correlation: MetricCounter,
    pub correlation_round_trips: u64,
    pub role_lookups: u64,
}

pub fn record_tree(node_count: usize, duration: Duration) {
    TREE_TOTAL.fetch_add(1, Ordering::Relaxed);
    if node_count == 0 {
        TREE_EMPTY.fetch_add(1, Ordering::Relaxed);
    }
    TREE_NODES.fetch_add(node_count as u64, Ordering::Relaxed);
    record_latency(&TREE_LAT_NS, &TREE_LAT_SAMPLES, duration);
}

pub fn record_correlation(round_trips: usize, duration: Duration) {
    CORRELATION_TOTAL.fetch_add(1, Ordering::Relaxed);
    CORRELATION_ROUND_TRIPS.fetch_add(round_trips as u64, Ordering::Relaxed);
    record_latency(&CORRELATION_LAT_NS, &CORRELATION_LAT_SAMPLES, duration);
}

pub fn record_role_lookup() {
    ROLE_LOOKUPS.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> MetricSnapshot {
    MetricSnapshot {
        tree: make_counter(
            TREE_TOTAL.load(Ordering::Relaxed),
            TREE_LAT_NS.load(Ordering::Relaxed),
            TREE_LAT_SAMPLES.load(Ordering::Relaxed),
        ),
        empty_trees: TREE_EMPTY.load(Ordering::Relaxed),
        tree_nodes: TREE_NODES.load(Ordering::Relaxed),
        correlation: make_counter(
            CORRELATION_TOTAL.load(Ordering::Relaxed),
            CORRELATION_LAT_NS.load(Ordering::Relaxed),
            CORRELATION_LAT_SAMPLES.load(Ordering::Relaxed),
        ),
        correlation_round_trips: CORRELATION_ROUND_TRIPS.load(Ordering::Relaxed),
        role_lookups: ROLE_LOOKUPS.load(Ordering::Relaxed),
    }
}

fn make_counter(total: u64, nanos: u64, samples: u64) -> MetricCounter {
    let avg_ms = if samples == 0 {
        0.0
    } else {
        (nanos as f64 / samples as f64) / 1_000_000.0
    };
    MetricCounter { total, avg_ms }
}

fn record_latency(total_ns: &AtomicU64, samples: &AtomicU64, duration: Duration) {
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    total_ns.fetch_add(nanos, Ordering::Relaxed);
    samples.fetch_add(1, Ordering::Relaxed);
}
