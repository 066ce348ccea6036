use connectors::mongo::MongoSettings;
use model::{
    core::{document::Namespace, identifiers::IdFormat},
    execution::{mutation::MutationSpec, selection::InvalidIdPolicy},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod error;
pub mod validated;
pub mod validator;

use error::SettingsError;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REPORT_DIR: &str = "reports";

/// A run as written in the JSON run file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub connection: MongoSettings,
    pub source: Namespace,
    #[serde(default)]
    pub target: Option<Namespace>,
    pub selection: SelectionSettings,
    pub mutation: MutationSpec,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionSettings {
    /// Server-side filter, written as (extended) JSON.
    Query {
        #[serde(default = "empty_filter")]
        filter: serde_json::Value,
        #[serde(default)]
        limit: Option<i64>,
    },
    /// Newline-delimited identifier file.
    IdFile {
        path: PathBuf,
        #[serde(default)]
        id_format: IdFormat,
        #[serde(default)]
        on_invalid: InvalidIdPolicy,
    },
}

fn empty_filter() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    pub fn writes() -> Self {
        RetrySettings {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }

    pub fn connections() -> Self {
        RetrySettings {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_drain_timeout_secs() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_SECS
}

fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "RetrySettings::writes")]
    pub retry: RetrySettings,
    #[serde(default = "RetrySettings::connections")]
    pub connect_retry: RetrySettings,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub fail_on_error: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetrySettings::writes(),
            connect_retry: RetrySettings::connections(),
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            dry_run: false,
            fail_on_error: false,
        }
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(DEFAULT_REPORT_DIR)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            report_dir: default_report_dir(),
        }
    }
}

/// Values given on the command line; they win over the run file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub dry_run: bool,
    pub fail_on_error: bool,
    pub report_dir: Option<PathBuf>,
    pub id_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(batch_size) = overrides.batch_size {
            self.execution.batch_size = batch_size;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.execution.concurrency = concurrency;
        }
        self.execution.dry_run |= overrides.dry_run;
        self.execution.fail_on_error |= overrides.fail_on_error;
        if let Some(dir) = &overrides.report_dir {
            self.output.report_dir = dir.clone();
        }
        if let Some(path) = &overrides.id_file {
            match &mut self.selection {
                SelectionSettings::IdFile { path: current, .. } => *current = path.clone(),
                SelectionSettings::Query { .. } => {
                    self.selection = SelectionSettings::IdFile {
                        path: path.clone(),
                        id_format: IdFormat::default(),
                        on_invalid: InvalidIdPolicy::default(),
                    }
                }
            }
        }
    }
}
