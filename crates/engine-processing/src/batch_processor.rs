use crate::{
    error::MutationError,
    mutation::{DocContext, DocumentNeed, MutationOp, Plan},
    retry::{classify_store_error, failure_kind},
};
use connectors::{
    error::StoreError,
    store::{DocumentStore, WriteIntent, WriteOutcome},
};
use engine_core::{
    connection::ConnectionManager,
    context::RunContext,
    retry::{RetryError, RetryPolicy},
};
use model::{
    core::{document::Document, identifiers::DocId},
    records::{
        batch::{Batch, SelectedDoc},
        outcome::{BatchResult, FailureKind, SkipReason},
    },
};
use std::{future::Future, sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};

/// Final state of a single document within a batch.
#[derive(Debug, Clone, PartialEq)]
enum DocOutcome {
    Succeeded,
    Skipped(SkipReason),
    Failed {
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl DocOutcome {
    fn from_store(err: RetryError<StoreError>) -> Self {
        DocOutcome::Failed {
            kind: failure_kind(err.error()),
            message: err.error().to_string(),
            attempts: err.attempts(),
        }
    }

    fn from_mutation(err: MutationError) -> Self {
        let kind = match &err {
            MutationError::Collision { .. } | MutationError::Invalid(_) => FailureKind::Validation,
            MutationError::Store(store) => failure_kind(store),
            MutationError::Connection(_) => FailureKind::Connection,
        };
        DocOutcome::Failed {
            kind,
            message: err.to_string(),
            attempts: 1,
        }
    }
}

/// Runs one mutation over the documents of a batch, sequentially, on a
/// single pooled session.
pub struct BatchProcessor {
    op: Arc<dyn MutationOp>,
    need: DocumentNeed,
    connections: Arc<ConnectionManager>,
    retry: RetryPolicy,
    ctx: RunContext,
}

impl BatchProcessor {
    pub fn new(
        op: Arc<dyn MutationOp>,
        connections: Arc<ConnectionManager>,
        retry: RetryPolicy,
        ctx: RunContext,
    ) -> Self {
        let need = op.document_need();
        Self {
            op,
            need,
            connections,
            retry,
            ctx,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.op.name()
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Processes every document of the batch. Never fails: errors are
    /// recorded per document in the returned result.
    pub async fn process(&self, batch: Batch) -> BatchResult {
        let started = Instant::now();
        let _in_flight = self.ctx.metrics.batch_started();
        let batch_id = batch.id.clone();

        info!(
            batch_id = %batch_id,
            docs = batch.len(),
            op = self.op.name(),
            "Processing batch"
        );

        let session = match self.connections.acquire().await {
            Ok(session) => session,
            Err(err) => {
                error!(
                    batch_id = %batch_id,
                    error = %err,
                    "No session available, failing batch"
                );
                let mut result = BatchResult::all_failed(
                    &batch,
                    FailureKind::Connection,
                    &err.to_string(),
                    err.attempts(),
                );
                result.duration = started.elapsed();
                self.ctx.metrics.increment_failed(result.failed() as u64);
                self.ctx.metrics.increment_batches(1);
                return result;
            }
        };

        let mut result = BatchResult::for_batch(&batch);
        let mut items = batch.items.into_iter();
        while let Some(item) = items.next() {
            if self.ctx.is_aborted() {
                result.record_cancelled(item.id);
                items
                    .by_ref()
                    .for_each(|rest| result.record_cancelled(rest.id));
                warn!(
                    batch_id = %batch_id,
                    cancelled = result.cancelled.len(),
                    "Batch aborted at document boundary"
                );
                break;
            }

            let mut retries = 0;
            let outcome = self
                .process_document(&*session, &batch_id, &item, &mut retries)
                .await;
            result.retries += retries;

            match outcome {
                DocOutcome::Succeeded => {
                    result.record_success();
                    self.ctx.metrics.increment_succeeded(1);
                }
                DocOutcome::Skipped(reason) => {
                    debug!(batch_id = %batch_id, doc_id = %item.id, %reason, "Document skipped");
                    result.record_skip(item.id, reason);
                    self.ctx.metrics.increment_skipped(1);
                }
                DocOutcome::Failed {
                    kind,
                    message,
                    attempts,
                } => {
                    warn!(
                        batch_id = %batch_id,
                        doc_id = %item.id,
                        %kind,
                        attempts,
                        error = %message,
                        "Document failed"
                    );
                    result.record_failure(item.id, kind, message, attempts);
                    self.ctx.metrics.increment_failed(1);
                }
            }
        }

        result.duration = started.elapsed();
        self.ctx.metrics.increment_batches(1);

        info!(
            batch_id = %batch_id,
            succeeded = result.succeeded,
            failed = result.failed(),
            skipped = result.skipped(),
            cancelled = result.cancelled.len(),
            retries = result.retries,
            duration_ms = result.duration.as_millis() as u64,
            "Batch processed"
        );
        result
    }

    async fn process_document(
        &self,
        store: &dyn DocumentStore,
        batch_id: &str,
        item: &SelectedDoc,
        retries: &mut u64,
    ) -> DocOutcome {
        let id = &item.id;
        let fetched: Document;
        let document = match (&self.need, &item.document) {
            (DocumentNeed::IdOnly, _) => None,
            (DocumentNeed::Document { .. }, Some(doc)) => Some(doc),
            (DocumentNeed::Document { projection }, None) => {
                let ns = self.op.lookup_namespace();
                let lookup = self
                    .with_retry(batch_id, id, retries, || {
                        store.find_one(ns, id, projection.clone())
                    })
                    .await;
                match lookup {
                    Ok(Some(doc)) => {
                        fetched = doc;
                        Some(&fetched)
                    }
                    Ok(None) => return DocOutcome::Skipped(SkipReason::NotFound),
                    Err(err) => return DocOutcome::from_store(err),
                }
            }
        };

        let intents = match self.op.plan(&DocContext::new(id, document)) {
            Ok(Plan::Write(intents)) => intents,
            Ok(Plan::Skip(reason)) => return DocOutcome::Skipped(reason),
            Err(err) => return DocOutcome::from_mutation(err),
        };

        if self.ctx.dry_run {
            debug!(
                batch_id,
                doc_id = %id,
                writes = intents.len(),
                "Dry run, writes not applied"
            );
            return DocOutcome::Succeeded;
        }

        let mut applied = false;
        for (index, intent) in intents.iter().enumerate() {
            let outcome = self
                .with_retry(batch_id, id, retries, || store.apply(intent))
                .await;
            match outcome {
                Ok(WriteOutcome::Applied) => applied = true,
                Ok(WriteOutcome::Unchanged) => {}
                // Only the first effective write decides whether the
                // document is there to be mutated at all.
                Ok(WriteOutcome::NotFound) if !applied => {
                    return DocOutcome::Skipped(SkipReason::NotFound);
                }
                Ok(WriteOutcome::AlreadyExists) if !applied => {
                    if index + 1 == intents.len() {
                        return DocOutcome::Skipped(SkipReason::AlreadyExists);
                    }
                    match self.already_landed(store, batch_id, id, intent, retries).await {
                        Ok(true) => {
                            debug!(
                                batch_id,
                                doc_id = %id,
                                ns = %intent.namespace(),
                                "Identical document already written, continuing"
                            );
                            applied = true;
                        }
                        Ok(false) => return DocOutcome::Skipped(SkipReason::AlreadyExists),
                        Err(err) => return DocOutcome::from_store(err),
                    }
                }
                Ok(other) => {
                    debug!(
                        batch_id,
                        doc_id = %id,
                        verb = intent.verb(),
                        outcome = ?other,
                        "Follow-up write had no effect"
                    );
                }
                Err(err) => return DocOutcome::from_store(err),
            }
        }

        if applied {
            DocOutcome::Succeeded
        } else {
            DocOutcome::Skipped(SkipReason::Unchanged)
        }
    }

    /// Whether an insert that hit an existing `_id` finds exactly the
    /// document it meant to write. A move interrupted between its target
    /// insert and its source delete leaves such a copy behind.
    async fn already_landed(
        &self,
        store: &dyn DocumentStore,
        batch_id: &str,
        id: &DocId,
        intent: &WriteIntent,
        retries: &mut u64,
    ) -> Result<bool, RetryError<StoreError>> {
        let WriteIntent::Insert { ns, document } = intent else {
            return Ok(false);
        };
        let existing = self
            .with_retry(batch_id, id, retries, || store.find_one(ns, id, None))
            .await?;
        Ok(existing.as_ref() == Some(document))
    }

    async fn with_retry<T, F, Fut>(
        &self,
        batch_id: &str,
        id: &DocId,
        retries: &mut u64,
        op: F,
    ) -> Result<T, RetryError<StoreError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retried = 0u64;
        let result = self
            .retry
            .run_observed(op, classify_store_error, |err, attempt, delay| {
                retried += 1;
                warn!(
                    batch_id,
                    doc_id = %id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient store error, retrying"
                );
            })
            .await;

        *retries += retried;
        self.ctx.metrics.increment_retries(retried);
        result
    }
}
