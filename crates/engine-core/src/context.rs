use crate::metrics::Metrics;
use model::core::identifiers::RunId;
use tokio_util::sync::CancellationToken;

/// Per-run handles shared by the executor and every worker.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub metrics: Metrics,
    /// Stops scheduling new batches.
    pub cancel: CancellationToken,
    /// Stops in-flight batches at the next document boundary.
    pub abort: CancellationToken,
    pub dry_run: bool,
}

impl RunContext {
    pub fn new(run_id: RunId, cancel: CancellationToken, dry_run: bool) -> Self {
        RunContext {
            run_id,
            metrics: Metrics::new(),
            cancel,
            abort: CancellationToken::new(),
            dry_run,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}
