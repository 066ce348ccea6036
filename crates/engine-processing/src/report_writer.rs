use crate::error::ReportWriteError;
use model::{core::identifiers::RunId, records::report::RunReport};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;

pub const REPORT_FILE: &str = "report.json";
pub const FAILURES_FILE: &str = "failures.jsonl";
pub const RETRY_IDS_FILE: &str = "failed_ids.txt";

/// Where the artifacts of one run ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub dir: PathBuf,
    pub report: PathBuf,
    pub failures: PathBuf,
    pub retry_ids: PathBuf,
}

/// Persists a finished run under `<report_dir>/<run_id>/`.
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(report_dir: &Path, run_id: &RunId) -> Self {
        Self {
            dir: report_dir.join(run_id.as_str()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the run directory ahead of execution, so an unusable
    /// `report_dir` fails the run before any document changes.
    pub fn prepare(&self) -> Result<(), ReportWriteError> {
        fs::create_dir_all(&self.dir)?;
        if fs::metadata(&self.dir)?.permissions().readonly() {
            return Err(ReportWriteError::FileWrite(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is read-only", self.dir.display()),
            )));
        }
        Ok(())
    }

    pub fn write(&self, report: &RunReport) -> Result<ReportPaths, ReportWriteError> {
        fs::create_dir_all(&self.dir)?;

        let paths = ReportPaths {
            dir: self.dir.clone(),
            report: self.dir.join(REPORT_FILE),
            failures: self.dir.join(FAILURES_FILE),
            retry_ids: self.dir.join(RETRY_IDS_FILE),
        };

        let file = BufWriter::new(File::create(&paths.report)?);
        serde_json::to_writer_pretty(file, report)?;

        // One JSON object per line
        let mut failures = BufWriter::new(File::create(&paths.failures)?);
        for failure in &report.failures {
            serde_json::to_writer(&mut failures, failure)?;
            writeln!(failures)?;
        }
        failures.flush()?;

        // Plain id list, directly usable as an id file selection
        let mut retry = BufWriter::new(File::create(&paths.retry_ids)?);
        for id in report.retry_ids() {
            writeln!(retry, "{id}")?;
        }
        retry.flush()?;

        info!(
            run_id = %report.run_id,
            dir = %self.dir.display(),
            failures = report.failures.len(),
            "Run report written"
        );
        Ok(paths)
    }
}
