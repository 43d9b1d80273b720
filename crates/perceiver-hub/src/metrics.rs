//! Counters for the hub's fail-soft paths and model traffic.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static MODEL_CALLS: AtomicU64 = AtomicU64::new(0);
static MODEL_RETRIES: AtomicU64 = AtomicU64::new(0);
static MODEL_FAILURES: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CHUNKS_PROCESSED: AtomicU64 = AtomicU64::new(0);
static SCAN_FAILURES: AtomicU64 = AtomicU64::new(0);
static PROBE_FAILURES: AtomicU64 = AtomicU64::new(0);
static SETTLE_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static RESOLUTION_FALLBACKS: AtomicU64 = AtomicU64::new(0);
static RESOLUTION_OMITTED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HubMetrics {
    pub model_calls: u64,
    pub model_retries: u64,
    pub model_failures: u64,
    pub cache_hits: u64,
    pub chunks_processed: u64,
    pub scan_failures: u64,
    pub probe_failures: u64,
    pub settle_timeouts: u64,
    pub resolution_fallbacks: u64,
    pub resolution_omitted: u64,
}

pub(crate) fn record_model_call(attempt: u32) {
    MODEL_CALLS.fetch_add(1, Ordering::Relaxed);
    if attempt > 1 {
        MODEL_RETRIES.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) fn record_model_failure() {
    MODEL_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_cache_hit() {
    CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_chunk() {
    CHUNKS_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_scan_failure() {
    SCAN_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_probe_failure() {
    PROBE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_settle_timeout() {
    SETTLE_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_resolution_fallback() {
    RESOLUTION_FALLBACKS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_resolution_omitted() {
    RESOLUTION_OMITTED.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> HubMetrics {
    HubMetrics {
        model_calls: MODEL_CALLS.load(Ordering::Relaxed),
        model_retries: MODEL_RETRIES.load(Ordering::Relaxed),
        model_failures: MODEL_FAILURES.load(Ordering::Relaxed),
        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        chunks_processed: CHUNKS_PROCESSED.load(Ordering::Relaxed),
        scan_failures: SCAN_FAILURES.load(Ordering::Relaxed),
        probe_failures: PROBE_FAILURES.load(Ordering::Relaxed),
        settle_timeouts: SETTLE_TIMEOUTS.load(Ordering::Relaxed),
        resolution_fallbacks: RESOLUTION_FALLBACKS.load(Ordering::Relaxed),
        resolution_omitted: RESOLUTION_OMITTED.load(Ordering::Relaxed),
    }
}
