//! Metrics collection for resilience events.
//!
//! This module provides metrics collection capabilities including counters, histograms,
//! and gauges with support for labels. The invoker reports every attempt, retry and
//! rejection through the configured [`MetricsCollector`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for resilience metrics.
///
/// Implementations of this trait are responsible for collecting and storing metrics
/// data such as counters, histograms, and gauges.
pub trait MetricsCollector: Send + Sync {
    /// Increments a counter by the given value.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the counter
    /// * `value` - The value to add to the counter
    /// * `labels` - Optional key-value labels for the metric
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    /// Records a value in a histogram.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the histogram
    /// * `value` - The value to record
    /// * `labels` - Optional key-value labels for the metric
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Sets a gauge to the given value.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the gauge
    /// * `value` - The value to set
    /// * `labels` - Optional key-value labels for the metric
    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// In-memory metrics collector for testing and simple use cases.
///
/// This collector stores all metrics in memory using thread-safe data structures.
/// It's useful for testing, development, or applications that don't need persistent
/// metrics storage.
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    counters: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, Vec<f64>>>,
    gauges: RwLock<HashMap<String, f64>>,
}

impl InMemoryMetricsCollector {
    /// Creates a new in-memory metrics collector.
    ///
    /// # Examples
    ///
    /// ```
    /// use integrations_resilience::observability::{InMemoryMetricsCollector, MetricsCollector};
    ///
    /// let collector = InMemoryMetricsCollector::new();
    /// collector.increment_counter("attempts", 1, &[]);
    /// assert_eq!(collector.get_counter("attempts"), 1);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the current value of a counter.
    ///
    /// Returns 0 if the counter doesn't exist. Labeled counters are keyed as
    /// `name:k1=v1,k2=v2`.
    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Gets all recorded values for a histogram.
    ///
    /// Returns an empty vector if the histogram doesn't exist.
    pub fn get_histogram(&self, name: &str) -> Vec<f64> {
        self.histograms
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Gets the current value of a gauge.
    ///
    /// Returns None if the gauge doesn't exist.
    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.gauges.read().get(name).copied()
    }

    /// Resets all metrics.
    pub fn reset(&self) {
        self.counters.write().clear();
        self.histograms.write().clear();
        self.gauges.write().clear();
    }

    fn make_key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            name.to_string()
        } else {
            let label_str: Vec<String> = labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{}:{}", name, label_str.join(","))
        }
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        let mut counters = self.counters.write();
        counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        let mut histograms = self.histograms.write();
        histograms.entry(key).or_default().push(value);
    }

    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        let mut gauges = self.gauges.write();
        gauges.insert(key, value);
    }
}

/// No-op metrics collector.
///
/// This collector discards all metrics. Useful for testing or when metrics
/// collection is not needed. The invoker defaults to it.
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn increment_counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}
    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Pre-defined metric names emitted by the invoker.
///
/// These constants provide standardized metric names for consistent monitoring
/// across applications.
pub mod metric_names {
    /// Finished attempts, labeled by target and outcome
    pub const ATTEMPTS: &str = "resilience.attempts.total";

    /// Per-attempt latency in milliseconds, labeled by target
    pub const ATTEMPT_LATENCY_MS: &str = "resilience.attempts.latency_ms";

    /// Backoff retries scheduled, labeled by target
    pub const RETRIES: &str = "resilience.retries.total";

    /// Calls rejected before reaching the target, labeled by target and reason
    /// (`rate_limited` or `circuit_open`)
    pub const REJECTED: &str = "resilience.rejected.total";
}
