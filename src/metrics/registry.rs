// Prometheus registry describing the batcher and the response cache
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, CounterVec, Encoder, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // METRIC BATCHER
    // ============================================================================

    /// Performance samples accepted by `record_metric`
    pub static ref PERF_METRICS_RECORDED: IntCounter = register_int_counter_with_registry!(
        Opts::new("perf_metrics_recorded_total", "Performance samples recorded"),
        REGISTRY
    ).unwrap();

    /// Flush attempts by outcome
    pub static ref PERF_METRICS_FLUSHES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("perf_metrics_flushes_total", "Performance metric flush attempts"),
        &["outcome"], // outcome: sent, requeued, rejected, backing_off
        REGISTRY
    ).unwrap();

    /// Samples discarded because retention hit `max_pending`
    pub static ref PERF_METRICS_DROPPED: IntCounter = register_int_counter_with_registry!(
        Opts::new("perf_metrics_dropped_total", "Performance samples dropped at the retention cap"),
        REGISTRY
    ).unwrap();

    /// Samples waiting for the next flush
    pub static ref PERF_METRICS_PENDING: IntGauge = register_int_gauge_with_registry!(
        Opts::new("perf_metrics_pending", "Performance samples waiting to be flushed"),
        REGISTRY
    ).unwrap();

    // ============================================================================
    // RESPONSE CACHE
    // ============================================================================

    /// Cache operations
    pub static ref RESPONSE_CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("response_cache_operations_total", "Response cache operations"),
        &["operation"], // operation: hit, local_hit, miss, expired, store, error
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        PERF_METRICS_RECORDED.inc();
        PERF_METRICS_FLUSHES.with_label_values(&["sent"]).inc();
        RESPONSE_CACHE_OPERATIONS.with_label_values(&["hit"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("perf_metrics_recorded_total"));
        assert!(metrics.contains("perf_metrics_flushes_total"));
        assert!(metrics.contains("response_cache_operations_total"));
    }
}
