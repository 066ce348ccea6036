use engine_processing::batch_processor::BatchProcessor;
use futures::FutureExt;
use model::records::{
    batch::{Batch, SelectedDoc},
    outcome::{BatchResult, FailureKind},
};
use std::{
    any::Any,
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinError, JoinSet},
    time::sleep,
};
use tracing::{error, info, warn};

/// Time in-flight batches get to reach a document boundary once the
/// abort token fired, before their tasks are dropped.
pub const ABORT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub scheduled: usize,
    pub panicked: usize,
    /// Batches whose task had to be dropped after the abort grace period.
    pub force_cancelled: usize,
}

/// Runs one task per batch with at most `concurrency` batches in flight,
/// forwarding every batch result to the aggregator.
pub struct WorkerPool {
    processor: Arc<BatchProcessor>,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<BatchResult>,
    /// Id-only copies of the batches still running, by batch index.
    pending: HashMap<usize, Batch>,
    results: mpsc::Sender<BatchResult>,
    drain_timeout: Duration,
    abort_grace: Duration,
    stats: PoolStats,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WorkerPool {
    pub fn new(
        processor: Arc<BatchProcessor>,
        concurrency: usize,
        drain_timeout: Duration,
        results: mpsc::Sender<BatchResult>,
    ) -> Self {
        Self {
            processor,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            pending: HashMap::new(),
            results,
            drain_timeout,
            abort_grace: ABORT_GRACE,
            stats: PoolStats::default(),
        }
    }

    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Schedules a batch once a worker slot is free. Results of batches
    /// finishing in the meantime are forwarded while waiting.
    ///
    /// Returns the batch back when cancellation was requested before a
    /// slot became available.
    pub async fn submit(&mut self, batch: Batch) -> Result<(), Batch> {
        let cancel = self.processor.context().cancel.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(batch),
                joined = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Some(joined) = joined {
                        self.collect(joined).await;
                    }
                }
                permit = self.semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else {
                        return Err(batch);
                    };
                    self.spawn(batch, permit);
                    return Ok(());
                }
            }
        }
    }

    fn spawn(&mut self, batch: Batch, permit: tokio::sync::OwnedSemaphorePermit) {
        let skeleton = Batch::new(batch.index, batch.ids().cloned().map(SelectedDoc::id).collect());
        let processor = self.processor.clone();
        let batch_index = batch.index;

        self.pending.insert(batch_index, skeleton.clone());
        self.stats.scheduled += 1;

        self.tasks.spawn(async move {
            let outcome = AssertUnwindSafe(processor.process(batch))
                .catch_unwind()
                .await;
            drop(permit);

            match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        batch_id = %skeleton.id,
                        error = %message,
                        "Batch task panicked, failing every document"
                    );
                    let metrics = &processor.context().metrics;
                    metrics.increment_failed(skeleton.len() as u64);
                    metrics.increment_batches(1);
                    BatchResult::all_failed(
                        &skeleton,
                        FailureKind::Aborted,
                        &format!("batch task panicked: {message}"),
                        1,
                    )
                }
            }
        });
    }

    async fn collect(&mut self, joined: Result<BatchResult, JoinError>) {
        match joined {
            Ok(result) => {
                self.pending.remove(&result.batch_index);
                if result.failures.iter().any(|f| f.kind == FailureKind::Aborted) {
                    self.stats.panicked += 1;
                }
                self.forward(result).await;
            }
            // Only tasks dropped by `abort_all` end up here; their batches
            // stay pending and are reported as cancelled.
            Err(err) => warn!(error = %err, "Batch task did not complete"),
        }
    }

    async fn forward(&self, result: BatchResult) {
        if let Err(err) = self.results.send(result).await {
            error!(
                batch_id = %err.0.batch_id,
                "Aggregator is gone, batch result dropped"
            );
        }
    }

    /// Waits for in-flight batches until none is left or `timeout` elapses.
    /// Returns true when every task finished.
    async fn drain_for(&mut self, timeout: Duration) -> bool {
        let deadline = sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => self.collect(joined).await,
                    None => return true,
                },
                _ = &mut deadline => return self.tasks.is_empty(),
            }
        }
    }

    /// Waits for every scheduled batch. Once the run is cancelled, in-flight
    /// batches get the drain timeout, then are told to stop at the next
    /// document boundary, then are dropped.
    pub async fn finish(mut self) -> PoolStats {
        let cancel = self.processor.context().cancel.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => self.collect(joined).await,
                    None => return self.stats,
                },
            }
        }

        info!(
            in_flight = self.tasks.len(),
            drain_timeout_ms = self.drain_timeout.as_millis() as u64,
            "Shutdown requested, draining in-flight batches"
        );
        if self.drain_for(self.drain_timeout).await {
            return self.stats;
        }

        warn!(
            in_flight = self.tasks.len(),
            "Drain timeout elapsed, aborting in-flight batches"
        );
        self.processor.context().abort.cancel();
        if self.drain_for(self.abort_grace).await {
            return self.stats;
        }

        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            self.collect(joined).await;
        }

        let leftover: Vec<Batch> = self.pending.drain().map(|(_, batch)| batch).collect();
        for batch in leftover {
            warn!(batch_id = %batch.id, docs = batch.len(), "Batch dropped, documents cancelled");
            self.stats.force_cancelled += 1;
            self.forward(BatchResult::all_cancelled(&batch)).await;
        }
        self.stats
    }
}
