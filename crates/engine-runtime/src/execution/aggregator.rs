use model::records::{outcome::BatchResult, report::RunReport};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

pub const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Single consumer folding batch results into the run report. The report
/// is handed back once every sender is dropped.
pub struct ResultAggregator {
    rx: mpsc::Receiver<BatchResult>,
    report: RunReport,
}

impl ResultAggregator {
    pub fn spawn(report: RunReport) -> (mpsc::Sender<BatchResult>, JoinHandle<RunReport>) {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(ResultAggregator { rx, report }.run());
        (tx, handle)
    }

    async fn run(mut self) -> RunReport {
        while let Some(result) = self.rx.recv().await {
            debug!(
                batch_id = %result.batch_id,
                succeeded = result.succeeded,
                failed = result.failed(),
                skipped = result.skipped(),
                cancelled = result.cancelled.len(),
                "Batch result received"
            );
            self.report.absorb(result);
        }
        self.report
    }
}
