use crate::{
    error::RunError,
    execution::{
        aggregator::ResultAggregator,
        factory,
        workers::{PoolStats, WorkerPool},
    },
};
use connectors::store::Connector;
use engine_config::{report::summary::render_summary, settings::validated::ValidatedConfig};
use engine_core::{
    connection::{ConnectionManager, PoolSettings},
    context::RunContext,
    state::{RunPhase, RunState},
};
use engine_processing::{
    batch_processor::BatchProcessor,
    batcher::Batcher,
    mutation::{DocumentNeed, MutationOp},
    report_writer::{ReportPaths, ReportWriter},
    selector::Selected,
};
use futures::StreamExt;
use model::{
    core::identifiers::RunId,
    records::report::RunReport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a finished run leaves behind. `paths` is `None` when the report
/// could not be persisted; the in-memory report is still complete.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub paths: Option<ReportPaths>,
    pub stats: PoolStats,
}

pub async fn run(
    config: ValidatedConfig,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
) -> Result<RunOutcome, RunError> {
    RunExecutor::new(config, connector, cancel)
        .execute()
        .await
}

/// Number of entries a selection resolves to, without mutating anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionCount {
    pub selected: u64,
    pub rejected: u64,
}

pub async fn count(
    config: &ValidatedConfig,
    connector: Arc<dyn Connector>,
) -> Result<SelectionCount, RunError> {
    let connections = Arc::new(ConnectionManager::new(connector, config.pool_settings()));
    let selector = factory::create_selector(config, connections.clone(), &DocumentNeed::IdOnly);
    info!(selection = %selector.describe(), "Counting selection");

    let mut stream = selector.select().await?;
    let mut count = SelectionCount::default();
    while let Some(item) = stream.next().await {
        match item? {
            Selected::Doc(_) => count.selected += 1,
            Selected::Rejected(_) => count.rejected += 1,
        }
    }

    info!(
        selected = count.selected,
        rejected = count.rejected,
        "Selection counted"
    );
    Ok(count)
}

/// Opens a session and pings the server. Returns the endpoint description.
pub async fn test_connection(
    connector: Arc<dyn Connector>,
    settings: PoolSettings,
) -> Result<String, RunError> {
    let connections = ConnectionManager::new(connector, settings);
    connections.verify().await?;
    let endpoint = connections.endpoint().to_string();
    connections.shutdown();
    Ok(endpoint)
}

struct RunExecutor {
    config: ValidatedConfig,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    state: RunState,
    run_id: RunId,
}

impl RunExecutor {
    fn new(config: ValidatedConfig, connector: Arc<dyn Connector>, cancel: CancellationToken) -> Self {
        Self {
            config,
            connector,
            cancel,
            state: RunState::new(),
            run_id: RunId::generate(),
        }
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), RunError> {
        debug!(run_id = %self.run_id, from = %self.state.phase(), to = %next, "Run phase change");
        Ok(self.state.advance(next)?)
    }

    fn fail<T>(&mut self, err: RunError) -> Result<T, RunError> {
        error!(
            run_id = %self.run_id,
            phase = %self.state.phase(),
            error = %err,
            "Run failed before execution"
        );
        self.advance(RunPhase::Failed)?;
        Err(err)
    }

    async fn setup(&self, connections: &ConnectionManager) -> Result<Arc<dyn MutationOp>, RunError> {
        connections.verify().await?;
        factory::create_operation(&self.config, connections).await
    }

    async fn execute(mut self) -> Result<RunOutcome, RunError> {
        info!(
            run_id = %self.run_id,
            source = %self.config.source,
            target = ?self.config.target.as_ref().map(ToString::to_string),
            op = self.config.mutation.kind(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            dry_run = self.config.dry_run,
            "Starting run"
        );

        let connections = Arc::new(ConnectionManager::new(
            self.connector.clone(),
            self.config.pool_settings(),
        ));

        let op = match self.setup(&connections).await {
            Ok(op) => op,
            Err(err) => return self.fail(err),
        };

        self.advance(RunPhase::Selecting)?;
        let selector =
            factory::create_selector(&self.config, connections.clone(), &op.document_need());
        info!(selection = %selector.describe(), "Resolving selection");
        let stream = match selector.select().await {
            Ok(stream) => stream,
            Err(err) => return self.fail(err.into()),
        };
        drop(selector);

        let writer = ReportWriter::new(&self.config.report_dir, &self.run_id);
        if let Err(err) = writer.prepare() {
            return self.fail(err.into());
        }

        self.advance(RunPhase::Batching)?;
        let mut batcher = Batcher::new(stream, self.config.batch_size);

        let ctx = RunContext::new(self.run_id.clone(), self.cancel.clone(), self.config.dry_run);
        let processor = Arc::new(BatchProcessor::new(
            op.clone(),
            connections.clone(),
            self.config.retry.clone(),
            ctx.clone(),
        ));
        let (results, aggregator) = ResultAggregator::spawn(RunReport::new(
            self.run_id.clone(),
            op.name(),
            self.config.dry_run,
        ));
        let mut pool = WorkerPool::new(
            processor,
            self.config.concurrency,
            self.config.drain_timeout,
            results.clone(),
        );

        self.advance(RunPhase::Executing)?;
        let interrupted = 'schedule: loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break 'schedule Some("shutdown requested".to_string()),
                next = batcher.next_batch() => next,
            };

            match next {
                Ok(Some(batch)) => {
                    if let Err(batch) = pool.submit(batch).await {
                        warn!(
                            batch_id = %batch.id,
                            docs = batch.len(),
                            "Shutdown requested, batch not scheduled"
                        );
                        break 'schedule Some("shutdown requested".to_string());
                    }
                }
                Ok(None) => break 'schedule None,
                Err(err) => {
                    error!(error = %err, "Selection failed mid-way, no further batches scheduled");
                    break 'schedule Some(format!("selection interrupted: {err}"));
                }
            }
        };

        let stats = pool.finish().await;
        drop(results);

        self.advance(RunPhase::Aggregating)?;
        let mut report = match aggregator.await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "Result aggregator crashed, batch results are lost");
                let mut report =
                    RunReport::new(self.run_id.clone(), op.name(), self.config.dry_run);
                report.interrupted = Some(format!("result aggregation failed: {err}"));
                report
            }
        };
        report.reject(batcher.take_rejections());
        if report.interrupted.is_none() {
            report.interrupted = interrupted;
        }
        report.finalize();

        match Arc::try_unwrap(connections) {
            Ok(connections) => connections.shutdown(),
            Err(_) => warn!("Connection pool still shared at the end of the run"),
        }

        for line in render_summary(&report) {
            info!("{line}");
        }
        let paths = match writer.write(&report) {
            Ok(paths) => Some(paths),
            Err(err) => {
                error!(
                    run_id = %self.run_id,
                    dir = %writer.dir().display(),
                    error = %err,
                    "Failed to persist run report"
                );
                None
            }
        };

        self.advance(RunPhase::Done)?;
        info!(
            run_id = %self.run_id,
            selected = batcher.selected(),
            metrics = ?ctx.metrics.snapshot(),
            "Run finished"
        );

        Ok(RunOutcome {
            report,
            paths,
            stats,
        })
    }
}
