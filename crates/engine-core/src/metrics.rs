use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    documents_processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    batches_processed: AtomicU64,
    retry_count: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

/// Live counters of a run, shared by every worker.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub documents_processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub batches_processed: u64,
    pub retry_count: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
}

/// Marks one batch as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<InnerMetrics>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn batch_started(&self) -> InFlightGuard {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn increment_succeeded(&self, count: u64) {
        self.inner
            .documents_processed
            .fetch_add(count, Ordering::Relaxed);
        self.inner.succeeded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failed(&self, count: u64) {
        self.inner
            .documents_processed
            .fetch_add(count, Ordering::Relaxed);
        self.inner.failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self, count: u64) {
        self.inner
            .documents_processed
            .fetch_add(count, Ordering::Relaxed);
        self.inner.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner
            .batches_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.inner.documents_processed.load(Ordering::Relaxed),
            succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.inner.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
