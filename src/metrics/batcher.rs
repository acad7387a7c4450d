// Performance metric batcher - buffers samples and ships them in batches
// Author: kelexine (https://github.com/kelexine)

use super::models::PerformanceMetric;
use super::registry::{
    PERF_METRICS_DROPPED, PERF_METRICS_FLUSHES, PERF_METRICS_PENDING, PERF_METRICS_RECORDED,
};
use crate::config::MetricsConfig;
use crate::error::FileChatError;
use crate::store::RemoteStore;
use crate::utils::retry::FlushBackoff;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Result of a single flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Empty,
    /// The batch of this size was accepted by the store
    Sent(usize),
    /// The store failed; the batch is back at the front of the queue
    Requeued(usize),
    /// The store refused the batch as invalid; it was dropped
    Rejected(usize),
    /// Another flush was already running
    InProgress,
    /// A threshold flush was skipped while backing off after a failure
    BackingOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Threshold,
    Timer,
    Manual,
}

/// How often [`MetricBatcher::flush_settled`] checks on a running flush
const SETTLE_POLL: Duration = Duration::from_millis(50);

#[derive(Serialize)]
struct MetricsPayload<'a> {
    metrics: &'a [PerformanceMetric],
}

/// Accumulates performance samples and sends them to the ingestion function.
///
/// A flush is attempted when the pending count reaches `batch_size`, on every
/// tick of the periodic timer, and on explicit [`MetricBatcher::flush`]. Only one
/// flush runs at a time. A failed batch is put back ahead of anything recorded
/// meanwhile, so the next successful flush delivers it first. Retention is
/// capped at `max_pending`; beyond that the oldest samples are dropped.
///
/// Handles are cheap to clone and share one queue. The timer stops on
/// [`MetricBatcher::destroy`] or when the last handle is dropped.
#[derive(Clone)]
pub struct MetricBatcher {
    inner: Arc<BatcherInner>,
}

struct BatcherInner {
    store: Arc<dyn RemoteStore>,
    config: MetricsConfig,
    pending: Mutex<VecDeque<PerformanceMetric>>,
    flushing: AtomicBool,
    destroyed: AtomicBool,
    backoff: Mutex<FlushBackoff>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag when a flush ends, however it ends
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A drained batch. Unless taken back with [`InFlightBatch::take`], it
/// returns to the front of the queue when dropped, so a cancelled flush
/// (e.g. the timer task aborted mid-send) loses nothing.
struct InFlightBatch<'a> {
    inner: &'a BatcherInner,
    batch: Option<Vec<PerformanceMetric>>,
}

impl InFlightBatch<'_> {
    fn metrics(&self) -> &[PerformanceMetric] {
        self.batch.as_deref().unwrap_or_default()
    }

    fn take(&mut self) -> Vec<PerformanceMetric> {
        self.batch.take().unwrap_or_default()
    }
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            let count = batch.len();
            self.inner.requeue(batch);
            warn!("Metric flush interrupted, requeued {} metrics", count);
        }
    }
}

impl MetricBatcher {
    /// Create a batcher without a periodic timer; flushes happen at the
    /// threshold or on demand.
    pub fn new(store: Arc<dyn RemoteStore>, config: MetricsConfig) -> Self {
        let backoff = FlushBackoff::new(&config);
        Self {
            inner: Arc::new(BatcherInner {
                store,
                config,
                pending: Mutex::new(VecDeque::new()),
                flushing: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                backoff: Mutex::new(backoff),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Create a batcher and start its periodic flush timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(store: Arc<dyn RemoteStore>, config: MetricsConfig) -> Self {
        let batcher = Self::new(store, config);
        batcher.spawn_timer();
        batcher
    }

    fn spawn_timer(&self) {
        let period = self.inner.config.flush_interval();
        let weak: Weak<BatcherInner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.flush(FlushTrigger::Timer).await;
            }
            debug!("Metric flush timer stopped");
        });

        debug!("Metric flush timer started (every {}s)", period.as_secs());
        *self.inner.timer.lock() = Some(handle);
    }

    /// Queue a sample; reaching the batch threshold schedules a flush.
    ///
    /// Never blocks on the network. After [`MetricBatcher::destroy`] samples
    /// are discarded.
    pub fn record_metric(&self, metric: PerformanceMetric) {
        if self.inner.destroyed.load(Ordering::Acquire) {
            trace!("Discarding metric {} recorded after destroy", metric.operation);
            return;
        }

        let pending = {
            let mut queue = self.inner.pending.lock();
            queue.push_back(metric);
            self.inner.enforce_cap(&mut queue);
            queue.len()
        };
        PERF_METRICS_RECORDED.inc();
        PERF_METRICS_PENDING.set(pending as i64);

        if pending >= self.inner.config.batch_size {
            self.trigger_flush(pending);
        }
    }

    /// Spawn a threshold flush; returns whether one was scheduled
    fn trigger_flush(&self, pending: usize) -> bool {
        if self.inner.flushing.load(Ordering::Acquire) {
            trace!("Flush already in flight, {} metrics wait for the next one", pending);
            return false;
        }
        if !self.inner.backoff.lock().ready(Instant::now()) {
            trace!("Backing off, {} metrics wait for the next flush", pending);
            return false;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    inner.flush(FlushTrigger::Threshold).await;
                });
                true
            }
            Err(_) => {
                debug!("No Tokio runtime available, {} metrics stay queued", pending);
                false
            }
        }
    }

    /// Send everything pending now, regardless of threshold or backoff
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush(FlushTrigger::Manual).await
    }

    /// Like [`MetricBatcher::flush`], but first waits for a flush already in
    /// flight to finish. Never returns [`FlushOutcome::InProgress`].
    pub async fn flush_settled(&self) -> FlushOutcome {
        loop {
            match self.flush().await {
                FlushOutcome::InProgress => time::sleep(SETTLE_POLL).await,
                outcome => return outcome,
            }
        }
    }

    /// Time `future`, record the sample, and hand back its result unchanged
    pub async fn instrument<F, T, E>(&self, operation: &str, future: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let result = future.await;
        let elapsed = started.elapsed();

        let metric = match &result {
            Ok(_) => PerformanceMetric::succeeded(operation, elapsed),
            Err(e) => PerformanceMetric::failed(operation, elapsed, e.to_string()),
        };
        self.record_metric(metric);
        result
    }

    /// Stop the periodic timer. Pending samples are not flushed.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }

        let unsent = self.inner.pending.lock().len();
        if unsent > 0 {
            warn!("Metric batcher destroyed with {} unsent metrics", unsent);
        } else {
            debug!("Metric batcher destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub fn timer_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .map_or(false, |timer| !timer.is_finished())
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Copy of the queue, oldest first
    pub fn pending(&self) -> Vec<PerformanceMetric> {
        self.inner.pending.lock().iter().cloned().collect()
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.inner.config
    }
}

impl BatcherInner {
    async fn flush(&self, trigger: FlushTrigger) -> FlushOutcome {
        if trigger == FlushTrigger::Threshold && !self.backoff.lock().ready(Instant::now()) {
            PERF_METRICS_FLUSHES.with_label_values(&["backing_off"]).inc();
            trace!("Threshold flush skipped while backing off");
            return FlushOutcome::BackingOff;
        }

        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushOutcome::InProgress;
        }
        let _guard = FlightGuard(&self.flushing);

        let batch: Vec<PerformanceMetric> = self.pending.lock().drain(..).collect();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        PERF_METRICS_PENDING.set(self.pending.lock().len() as i64);

        let batch_id = Uuid::new_v4();
        let count = batch.len();
        debug!(%batch_id, count, ?trigger, "Flushing performance metrics");
        let mut in_flight = InFlightBatch {
            inner: self,
            batch: Some(batch),
        };

        match self.send(in_flight.metrics()).await {
            Ok(()) => {
                in_flight.take();
                self.backoff.lock().on_success();
                PERF_METRICS_FLUSHES.with_label_values(&["sent"]).inc();
                info!(%batch_id, "Flushed {} performance metrics", count);
                FlushOutcome::Sent(count)
            }
            Err(e) if !e.is_transient() => {
                in_flight.take();
                PERF_METRICS_DROPPED.inc_by(count as u64);
                PERF_METRICS_FLUSHES.with_label_values(&["rejected"]).inc();
                warn!(
                    %batch_id,
                    "Store refused {} performance metrics, dropping them: {}",
                    count,
                    e
                );
                FlushOutcome::Rejected(count)
            }
            Err(e) => {
                let retry_in = self.backoff.lock().on_failure(Instant::now());
                self.requeue(in_flight.take());
                PERF_METRICS_FLUSHES.with_label_values(&["requeued"]).inc();
                warn!(
                    %batch_id,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Failed to flush {} performance metrics, requeued: {}",
                    count,
                    e
                );
                FlushOutcome::Requeued(count)
            }
        }
    }

    async fn send(&self, batch: &[PerformanceMetric]) -> crate::error::Result<()> {
        let payload = serde_json::to_value(MetricsPayload { metrics: batch })?;
        let timeout = self.config.rpc_timeout();

        let response = time::timeout(
            timeout,
            self.store.invoke_function(&self.config.function_name, payload),
        )
        .await
        .map_err(|_| FileChatError::Timeout(timeout))??;

        response.into_result().map(|_| ())
    }

    /// Put a failed batch back ahead of anything recorded meanwhile
    fn requeue(&self, batch: Vec<PerformanceMetric>) {
        let pending = {
            let mut queue = self.pending.lock();
            for metric in batch.into_iter().rev() {
                queue.push_front(metric);
            }
            self.enforce_cap(&mut queue);
            queue.len()
        };
        PERF_METRICS_PENDING.set(pending as i64);
    }

    /// Drop the oldest samples beyond `max_pending`; returns how many went
    fn enforce_cap(&self, queue: &mut VecDeque<PerformanceMetric>) -> usize {
        let excess = queue.len().saturating_sub(self.config.max_pending);
        if excess > 0 {
            queue.drain(..excess);
            PERF_METRICS_DROPPED.inc_by(excess as u64);
            warn!(
                "Metric retention limit {} reached, dropped {} oldest samples",
                self.config.max_pending, excess
            );
        }
        excess
    }
}

impl Drop for BatcherInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fault, MemoryStore};

    fn config(batch_size: usize, max_pending: usize) -> MetricsConfig {
        MetricsConfig {
            batch_size,
            max_pending,
            ..Default::default()
        }
    }

    fn metric(n: usize) -> PerformanceMetric {
        PerformanceMetric::succeeded(format!("op-{}", n), Duration::from_millis(n as u64))
    }

    #[tokio::test]
    async fn test_manual_flush_of_empty_queue() {
        let store = Arc::new(MemoryStore::new());
        let batcher = MetricBatcher::new(store.clone(), config(10, 100));
        assert_eq!(batcher.flush().await, FlushOutcome::Empty);
        assert_eq!(store.function_attempts(), 0);
    }

    #[tokio::test]
    async fn test_requeue_respects_cap() {
        let store = Arc::new(MemoryStore::new());
        store.fail_functions(Some(Fault::Reject));
        let batcher = MetricBatcher::new(store.clone(), config(100, 5));

        for n in 0..5 {
            batcher.record_metric(metric(n));
        }
        assert_eq!(batcher.flush().await, FlushOutcome::Requeued(5));
        batcher.record_metric(metric(5));
        batcher.record_metric(metric(6));

        let kept: Vec<String> = batcher.pending().into_iter().map(|m| m.operation).collect();
        assert_eq!(kept, vec!["op-2", "op-3", "op-4", "op-5", "op-6"]);
    }

    #[tokio::test]
    async fn test_flush_guard_is_single_flight() {
        let store = Arc::new(MemoryStore::new());
        let batcher = MetricBatcher::new(store.clone(), config(100, 100));
        batcher.record_metric(metric(1));

        batcher.inner.flushing.store(true, Ordering::Release);
        assert_eq!(batcher.flush().await, FlushOutcome::InProgress);
        assert_eq!(batcher.pending_len(), 1);

        batcher.inner.flushing.store(false, Ordering::Release);
        assert_eq!(batcher.flush().await, FlushOutcome::Sent(1));
    }

    #[tokio::test]
    async fn test_no_threshold_task_while_backing_off() {
        let store = Arc::new(MemoryStore::new());
        let batcher = MetricBatcher::new(store.clone(), config(100, 100));
        store.fail_next_functions(Fault::Reject, 1);

        batcher.record_metric(metric(1));
        assert_eq!(batcher.flush().await, FlushOutcome::Requeued(1));
        assert!(!batcher.trigger_flush(1));

        assert_eq!(batcher.flush().await, FlushOutcome::Sent(1));
        assert!(batcher.trigger_flush(0));
    }

    #[tokio::test]
    async fn test_threshold_flush_waits_out_backoff() {
        let store = Arc::new(MemoryStore::new());
        let batcher = MetricBatcher::new(store.clone(), config(100, 100));
        store.fail_next_functions(Fault::ReportError, 1);

        batcher.record_metric(metric(1));
        assert_eq!(batcher.flush().await, FlushOutcome::Requeued(1));
        assert_eq!(
            batcher.inner.flush(FlushTrigger::Threshold).await,
            FlushOutcome::BackingOff
        );
        // explicit flushes ignore the backoff gate
        assert_eq!(batcher.flush().await, FlushOutcome::Sent(1));
    }
}
