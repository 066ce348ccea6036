use crate::error::CliError;
use engine_config::report::summary::render_summary;
use engine_processing::dedupe::DuplicateAnalysis;
use engine_runtime::{RunOutcome, execution::executor::SelectionCount};
use std::path::PathBuf;

fn generate_report_json(outcome: &RunOutcome) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(&outcome.report)?)
}

pub fn print_outcome(outcome: &RunOutcome, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", generate_report_json(outcome)?);
        return Ok(());
    }

    for line in render_summary(&outcome.report) {
        println!("{line}");
    }
    let Some(paths) = &outcome.paths else {
        println!("Report could not be written, see the log for details");
        return Ok(());
    };
    println!("Report written to {}", paths.report.display());
    if outcome.report.has_errors() {
        println!(
            "Failed ids written to {} (rerun with --id-file to retry them)",
            paths.retry_ids.display()
        );
    }
    Ok(())
}

pub fn print_count(count: &SelectionCount) -> Result<(), CliError> {
    let json = serde_json::json!({
        "selected": count.selected,
        "rejected": count.rejected,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub fn print_dedupe(analysis: &DuplicateAnalysis, written: &[PathBuf]) {
    print!("{}", analysis.stats());
    for path in written {
        println!("Wrote {}", path.display());
    }
}
