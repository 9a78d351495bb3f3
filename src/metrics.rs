//! Counters for replay anomalies.
//!
//! A transform whose source nodes are not all present is skipped by the
//! replay engine. That can be legitimate (nothing left to merge) or a sign
//! of a session deleted without cascading, so every skip is counted here and
//! logged, rather than swallowed.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::info;

use crate::replay::SkippedTransform;

/// Metric name for skipped transforms.
pub const TRANSFORM_SKIPPED_METRIC: &str = "resolver_transform_skipped_total";

/// Metric name for completed replays.
pub const REPLAY_COMPLETED_METRIC: &str = "resolver_replay_completed_total";

/// Sink for replay counters.
pub trait ReplayMetrics: Send + Sync {
    /// Increment a counter by 1.
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]);

    /// Record a skipped transform.
    fn record_skipped_transform(&self, skipped: &SkippedTransform) {
        self.increment(
            TRANSFORM_SKIPPED_METRIC,
            &[("resolution", skipped.resolution_id.as_str())],
        );
    }

    /// Record a completed replay.
    fn record_replay(&self, skipped: usize) {
        let outcome = if skipped == 0 { "clean" } else { "with_skips" };
        self.increment(REPLAY_COMPLETED_METRIC, &[("outcome", outcome)]);
    }
}

/// Discards every counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl ReplayMetrics for NoOpMetrics {
    fn increment(&self, _metric_name: &str, _labels: &[(&str, &str)]) {}
}

/// Emits counters as structured log events for log-based aggregation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetrics;

impl ReplayMetrics for LogMetrics {
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        info!(
            target: "network_resolver::metrics",
            metric = metric_name,
            labels = ?labels,
            "counter_increment"
        );
    }
}

/// In-memory counters for tests.
#[derive(Debug, Default)]
pub struct TestMetrics {
    /// Counter values keyed by metric name and labels.
    pub counters: Mutex<HashMap<String, u64>>,
}

impl ReplayMetrics for TestMetrics {
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        let key = format!("{}:{:?}", metric_name, labels);
        *self.counters.lock().entry(key).or_insert(0) += 1;
    }
}

impl TestMetrics {
    /// Sum of all counters for a metric, across labels.
    pub fn get_count(&self, metric_name: &str) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(metric_name))
            .map(|(_, v)| v)
            .sum()
    }
}

impl<M: ReplayMetrics + ?Sized> ReplayMetrics for std::sync::Arc<M> {
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        (**self).increment(metric_name, labels)
    }

    fn record_skipped_transform(&self, skipped: &SkippedTransform) {
        (**self).record_skipped_transform(skipped)
    }

    fn record_replay(&self, skipped: usize) {
        (**self).record_replay(skipped)
    }
}
