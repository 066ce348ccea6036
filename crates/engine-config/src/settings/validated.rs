use connectors::mongo::MongoSettings;
use engine_core::{connection::PoolSettings, retry::RetryPolicy};
use model::{
    core::{
        document::{Document, Namespace},
        identifiers::IdFormat,
    },
    execution::{mutation::MutationSpec, selection::InvalidIdPolicy},
};
use std::{path::PathBuf, time::Duration};

/// Working set definition after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedSelection {
    Query {
        filter: Document,
        limit: Option<i64>,
    },
    IdFile {
        path: PathBuf,
        id_format: IdFormat,
        on_invalid: InvalidIdPolicy,
    },
}

/// Immutable, validated configuration used throughout a run.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub connection: MongoSettings,
    pub source: Namespace,
    pub target: Option<Namespace>,
    pub selection: ValidatedSelection,
    pub mutation: MutationSpec,
    pub batch_size: usize,
    pub concurrency: usize,
    /// Per-document write retries.
    pub retry: RetryPolicy,
    /// Session acquisition retries.
    pub connect_retry: RetryPolicy,
    pub acquire_timeout: Duration,
    pub drain_timeout: Duration,
    pub dry_run: bool,
    pub fail_on_error: bool,
    pub report_dir: PathBuf,
}

impl ValidatedConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_sessions: self.concurrency as u64,
            acquire_timeout: self.acquire_timeout,
            retry: self.connect_retry.clone(),
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.mutation.is_destructive()
    }
}
