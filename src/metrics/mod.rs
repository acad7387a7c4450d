// Performance metrics: sample model, batching shipper, and Prometheus registry
// Author: kelexine (https://github.com/kelexine)

mod batcher;
mod models;
mod registry;

pub use batcher::{FlushOutcome, MetricBatcher};
pub use models::PerformanceMetric;
pub use registry::{
    gather_metrics, PERF_METRICS_DROPPED, PERF_METRICS_FLUSHES, PERF_METRICS_PENDING,
    PERF_METRICS_RECORDED, RESPONSE_CACHE_OPERATIONS,
};

/// Helper to record response cache operations
pub fn record_cache_operation(operation: &str) {
    RESPONSE_CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}
