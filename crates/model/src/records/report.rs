use crate::{
    core::identifiers::{DocId, RunId},
    records::outcome::{BatchResult, FailureRecord, Rejection, SkipReason},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Final reduction of every batch result of a run.
///
/// Folding is commutative: counters are summed and the id lists are only
/// sorted by [`RunReport::finalize`], so the order in which batches complete
/// does not change the finished report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub operation: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub cancelled: u64,
    pub batches: u64,
    pub retries: u64,

    pub skipped_by_reason: BTreeMap<SkipReason, u64>,
    pub failures: Vec<FailureRecord>,
    pub not_found: Vec<DocId>,
    pub cancelled_ids: Vec<DocId>,
    pub rejected: Vec<Rejection>,

    /// Set when the run was stopped by a shutdown request.
    pub interrupted: Option<String>,
}

impl RunReport {
    pub fn new(run_id: RunId, operation: impl Into<String>, dry_run: bool) -> Self {
        RunReport {
            run_id,
            operation: operation.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            batches: 0,
            retries: 0,
            skipped_by_reason: BTreeMap::new(),
            failures: Vec::new(),
            not_found: Vec::new(),
            cancelled_ids: Vec::new(),
            rejected: Vec::new(),
            interrupted: None,
        }
    }

    pub fn absorb(&mut self, result: BatchResult) {
        self.batches += 1;
        self.total += result.total as u64;
        self.succeeded += result.succeeded as u64;
        self.failed += result.failures.len() as u64;
        self.skipped += result.skips.len() as u64;
        self.cancelled += result.cancelled.len() as u64;
        self.retries += result.retries;

        for skip in result.skips {
            *self.skipped_by_reason.entry(skip.reason).or_insert(0) += 1;
            if skip.reason == SkipReason::NotFound {
                self.not_found.push(skip.id);
            }
        }
        self.failures.extend(result.failures);
        self.cancelled_ids.extend(result.cancelled);
    }

    /// Combines two partial reports of the same run.
    pub fn merge(&mut self, other: RunReport) {
        self.batches += other.batches;
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
        self.retries += other.retries;
        for (reason, count) in other.skipped_by_reason {
            *self.skipped_by_reason.entry(reason).or_insert(0) += count;
        }
        self.failures.extend(other.failures);
        self.not_found.extend(other.not_found);
        self.cancelled_ids.extend(other.cancelled_ids);
        self.rejected.extend(other.rejected);
        if self.interrupted.is_none() {
            self.interrupted = other.interrupted;
        }
    }

    pub fn reject(&mut self, rejections: impl IntoIterator<Item = Rejection>) {
        self.rejected.extend(rejections);
    }

    /// Stamps the finish time and puts every id list in a stable order.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
        self.failures
            .sort_by_cached_key(|f| (f.id.to_string(), f.batch_id.clone()));
        self.not_found.sort_by_cached_key(ToString::to_string);
        self.cancelled_ids.sort_by_cached_key(ToString::to_string);
        self.rejected
            .sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.value.cmp(&b.value)));
    }

    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed + self.skipped + self.cancelled == self.total
            && self.failed == self.failures.len() as u64
    }

    pub fn has_errors(&self) -> bool {
        self.failed > 0
    }

    /// Identifiers worth feeding into a follow-up run: failures first, then
    /// documents that were never attempted.
    pub fn retry_ids(&self) -> Vec<&DocId> {
        self.failures
            .iter()
            .map(|f| &f.id)
            .chain(self.cancelled_ids.iter())
            .collect()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} {}: total={} succeeded={} failed={} skipped={} cancelled={} rejected={} batches={}",
            self.run_id,
            self.operation,
            self.total,
            self.succeeded,
            self.failed,
            self.skipped,
            self.cancelled,
            self.rejected.len(),
            self.batches
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        batch::{Batch, SelectedDoc},
        outcome::FailureKind,
    };

    fn batch(index: usize, ids: &[i64]) -> Batch {
        Batch::new(
            index,
            ids.iter().map(|i| SelectedDoc::id(DocId::Int(*i))).collect(),
        )
    }

    fn results() -> Vec<BatchResult> {
        let mut first = BatchResult::for_batch(&batch(0, &[1, 2, 3]));
        first.record_success();
        first.record_failure(DocId::Int(3), FailureKind::Write, "boom".into(), 3);
        first.record_skip(DocId::Int(2), SkipReason::NotFound);

        let mut second = BatchResult::for_batch(&batch(1, &[4, 5]));
        second.record_success();
        second.record_failure(DocId::Int(4), FailureKind::Connection, "down".into(), 5);

        let third = BatchResult::all_cancelled(&batch(2, &[6]));
        vec![first, second, third]
    }

    #[test]
    fn test_absorb_keeps_invariant() {
        let mut report = RunReport::new(RunId::new("r"), "delete", false);
        for result in results() {
            report.absorb(result);
        }
        report.finalize();

        assert_eq!(report.total, 6);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.batches, 3);
        assert!(report.is_consistent());
        assert_eq!(report.not_found, vec![DocId::Int(2)]);
        assert_eq!(report.skipped_by_reason.get(&SkipReason::NotFound), Some(&1));
        assert!(report.has_errors());
    }

    #[test]
    fn test_fold_order_does_not_matter() {
        let mut forward = RunReport::new(RunId::new("r"), "delete", false);
        results().into_iter().for_each(|r| forward.absorb(r));
        forward.finalize();

        let mut backward = RunReport::new(RunId::new("r"), "delete", false);
        results().into_iter().rev().for_each(|r| backward.absorb(r));
        backward.finalize();

        assert_eq!(forward.total, backward.total);
        assert_eq!(forward.failures, backward.failures);
        assert_eq!(forward.cancelled_ids, backward.cancelled_ids);
    }

    #[test]
    fn test_merge_partials() {
        let mut parts = results().into_iter();
        let mut left = RunReport::new(RunId::new("r"), "delete", false);
        left.absorb(parts.next().unwrap());
        let mut right = RunReport::new(RunId::new("r"), "delete", false);
        parts.for_each(|r| right.absorb(r));

        left.merge(right);
        left.finalize();
        assert_eq!(left.total, 6);
        assert!(left.is_consistent());
        let retry: Vec<String> = left.retry_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(retry, vec!["3", "4", "6"]);
    }
}
