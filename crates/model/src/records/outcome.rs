use crate::{core::identifiers::DocId, records::batch::Batch};
use serde::Serialize;
use std::{fmt, time::Duration};

/// Why a document ended up in the failure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No session could be acquired, or the connection dropped mid-call.
    Connection,
    /// The write (or the read preceding it) failed permanently or exhausted its retries.
    Write,
    /// The document cannot be mutated under the configured policy.
    Validation,
    /// The batch task panicked or failed as a whole.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Connection => "connection",
            FailureKind::Write => "write",
            FailureKind::Validation => "validation",
            FailureKind::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a document was left untouched without counting as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The document disappeared between selection and mutation.
    NotFound,
    /// The mutation would not change the document.
    Unchanged,
    /// The document already exists in the target collection.
    AlreadyExists,
    /// None of the requested fields exist on the source document.
    SourceFieldMissing,
    /// The document did not match the operation's criteria.
    NoMatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NotFound => "not_found",
            SkipReason::Unchanged => "unchanged",
            SkipReason::AlreadyExists => "already_exists",
            SkipReason::SourceFieldMissing => "source_field_missing",
            SkipReason::NoMatch => "no_match",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub id: DocId,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
    pub batch_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipRecord {
    pub id: DocId,
    pub reason: SkipReason,
}

/// An identifier that never made it into the selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// 1-based line number when the identifier came from a file.
    pub line: Option<usize>,
    pub value: String,
    pub reason: String,
}

/// Outcome of one batch. Every document of the batch lands in exactly one
/// of `succeeded`, `failures`, `skips` or `cancelled`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub batch_index: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<FailureRecord>,
    pub skips: Vec<SkipRecord>,
    pub cancelled: Vec<DocId>,
    pub retries: u64,
    #[serde(skip)]
    pub duration: Duration,
}

impl BatchResult {
    pub fn for_batch(batch: &Batch) -> Self {
        BatchResult {
            batch_id: batch.id.clone(),
            batch_index: batch.index,
            total: batch.len(),
            ..Default::default()
        }
    }

    /// Result in which every document of the batch failed with the same error.
    pub fn all_failed(batch: &Batch, kind: FailureKind, message: &str, attempts: u32) -> Self {
        let mut result = Self::for_batch(batch);
        for id in batch.ids() {
            result.record_failure(id.clone(), kind, message.to_string(), attempts);
        }
        result
    }

    /// Result for a batch that was scheduled but stopped before any document ran.
    pub fn all_cancelled(batch: &Batch) -> Self {
        let mut result = Self::for_batch(batch);
        result.cancelled = batch.ids().cloned().collect();
        result
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, id: DocId, kind: FailureKind, message: String, attempts: u32) {
        self.failures.push(FailureRecord {
            id,
            kind,
            message,
            attempts,
            batch_id: self.batch_id.clone(),
        });
    }

    pub fn record_skip(&mut self, id: DocId, reason: SkipReason) {
        self.skips.push(SkipRecord { id, reason });
    }

    pub fn record_cancelled(&mut self, id: DocId) {
        self.cancelled.push(id);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn skipped(&self) -> usize {
        self.skips.len()
    }

    /// True when every document of the batch is accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.succeeded + self.failed() + self.skipped() + self.cancelled.len() == self.total
    }
}
