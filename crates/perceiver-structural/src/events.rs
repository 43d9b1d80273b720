use std::time::Duration;
use tracing::debug;

use crate::metrics;

pub fn emit_tree(node_count: usize, iframe_count: usize, duration: Duration) {
    metrics::record_tree(node_count, duration);
    debug!(
        target: "perceiver.events",
        node_count,
        iframe_count,
        elapsed_ms = duration.as_millis() as u64,
        "structural.tree.built"
    );
}

pub fn emit_correlation(
    candidate_count: usize,
    matched: usize,
    round_trips: usize,
    duration: Duration,
) {
    metrics::record_correlation(round_trips, duration);
    debug!(
        target: "perceiver.events",
        candidate_count,
        matched,
        round_trips,
        elapsed_ms = duration.as_millis() as u64,
        "structural.correlation.built"
    );
}
