use model::records::report::RunReport;

const MAX_LISTED_FAILURES: usize = 10;

/// Human-readable rendering of a finished run, one line per entry.
pub fn render_summary(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();

    let mode = if report.dry_run { " (dry run)" } else { "" };
    lines.push(format!("Run {} - {}{mode}", report.run_id, report.operation));
    if let Some(ms) = report.duration_ms() {
        lines.push(format!("  duration:   {:.1}s", ms as f64 / 1000.0));
    }
    lines.push(format!("  total:      {}", report.total));
    lines.push(format!("  succeeded:  {}", report.succeeded));
    lines.push(format!("  failed:     {}", report.failed));
    lines.push(format!("  skipped:    {}", report.skipped));
    for (reason, count) in &report.skipped_by_reason {
        lines.push(format!("    {reason}: {count}"));
    }
    if report.cancelled > 0 {
        lines.push(format!("  cancelled:  {}", report.cancelled));
    }
    if !report.rejected.is_empty() {
        lines.push(format!("  rejected:   {}", report.rejected.len()));
    }
    lines.push(format!("  batches:    {}", report.batches));
    if report.retries > 0 {
        lines.push(format!("  retries:    {}", report.retries));
    }
    if let Some(reason) = &report.interrupted {
        lines.push(format!("  interrupted: {reason}"));
    }

    if !report.failures.is_empty() {
        lines.push("  failures:".to_string());
        for failure in report.failures.iter().take(MAX_LISTED_FAILURES) {
            lines.push(format!(
                "    {} [{}] after {} attempt(s): {}",
                failure.id, failure.kind, failure.attempts, failure.message
            ));
        }
        if report.failures.len() > MAX_LISTED_FAILURES {
            lines.push(format!(
                "    ... and {} more",
                report.failures.len() - MAX_LISTED_FAILURES
            ));
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::identifiers::{DocId, RunId},
        records::{
            batch::{Batch, SelectedDoc},
            outcome::{BatchResult, FailureKind, SkipReason},
        },
    };

    #[test]
    fn test_summary_lists_counts_and_failures() {
        let batch = Batch::new(
            0,
            (0..12).map(|i| SelectedDoc::id(DocId::Int(i))).collect(),
        );
        let mut result = BatchResult::for_batch(&batch);
        for i in 0..11 {
            result.record_failure(DocId::Int(i), FailureKind::Write, "rejected".into(), 3);
        }
        result.record_skip(DocId::Int(11), SkipReason::NotFound);

        let mut report = RunReport::new(RunId::new("run-1"), "delete", true);
        report.absorb(result);
        report.finalize();

        let lines = render_summary(&report);
        assert_eq!(lines[0], "Run run-1 - delete (dry run)");
        assert!(lines.iter().any(|l| l == "  failed:     11"));
        assert!(lines.iter().any(|l| l == "    not_found: 1"));
        assert!(lines.iter().any(|l| l == "    ... and 1 more"));
    }
}
