use engine_core::error::{ConnectionError, StateError};
use engine_processing::error::{MutationError, ReportWriteError, SelectError};
use thiserror::Error;

/// Errors that end a run before it reaches execution, or that prevent
/// its report from being produced.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The working set could not be opened.
    #[error("Selection error: {0}")]
    Selection(#[from] SelectError),

    #[error("Mutation setup error: {0}")]
    Mutation(#[from] MutationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    /// An error occurred while joining the aggregator task.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed to persist run report: {0}")]
    Report(#[from] ReportWriteError),
}
