use connectors::{
    memory::{InMemoryStore, MemoryConnector},
    store::Connector,
};
use engine_config::settings::{RunConfig, validated::ValidatedConfig, validator::SettingsValidator};
use engine_runtime::{RunOutcome, error::RunError};
use model::core::{
    document::{Document, Namespace, doc},
    identifiers::DocId,
};
use serde_json::{Value, json};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const DB: &str = "shop";
pub const SOURCE: &str = "orders";
pub const TARGET: &str = "orders_archive";

pub fn source_ns() -> Namespace {
    Namespace::new(DB, SOURCE)
}

pub fn target_ns() -> Namespace {
    Namespace::new(DB, TARGET)
}

/// `{ _id: i, n: i }` for every i in `1..=n`.
pub fn numbered(n: i64) -> Vec<Document> {
    (1..=n).map(|i| doc! { "_id": i, "n": i }).collect()
}

/// An in-memory database plus a scratch directory for id files and reports.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub connector: Arc<MemoryConnector>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_connector(MemoryConnector::new)
    }

    pub fn with_connector(build: impl FnOnce(Arc<InMemoryStore>) -> MemoryConnector) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let connector = Arc::new(build(store.clone()));
        Harness {
            store,
            connector,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn seed_source(&self, docs: Vec<Document>) -> &Self {
        self.store.seed(&source_ns(), docs);
        self
    }

    pub fn seed_target(&self, docs: Vec<Document>) -> &Self {
        self.store.seed(&target_ns(), docs);
        self
    }

    pub fn report_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    /// Writes `lines` to an id file inside the scratch directory.
    pub fn id_file(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    /// Builds a validated run against `orders` (and `orders_archive` as the
    /// target). `overrides` is merged into the generated run file, so tests
    /// only spell out what they care about.
    pub fn config(&self, selection: Value, mutation: Value, overrides: Value) -> ValidatedConfig {
        let mut raw = json!({
            "source": { "database": DB, "collection": SOURCE },
            "target": { "database": DB, "collection": TARGET },
            "selection": selection,
            "mutation": mutation,
            "execution": {
                "batch_size": 3,
                "concurrency": 2,
                "retry": { "max_attempts": 3, "base_delay_ms": 1, "max_delay_ms": 5 },
                "connect_retry": { "max_attempts": 3, "base_delay_ms": 1, "max_delay_ms": 5 },
                "drain_timeout_secs": 5,
                "acquire_timeout_secs": 5
            },
            "output": { "report_dir": self.report_dir() }
        });
        merge(&mut raw, overrides);

        let config = RunConfig::from_json_str(&raw.to_string()).unwrap();
        SettingsValidator::new(&config).validate().unwrap()
    }

    pub async fn try_run(&self, config: ValidatedConfig) -> Result<RunOutcome, RunError> {
        self.try_run_with(config, CancellationToken::new()).await
    }

    pub async fn try_run_with(
        &self,
        config: ValidatedConfig,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let connector: Arc<dyn Connector> = self.connector.clone();
        engine_runtime::run(config, connector, cancel).await
    }

    /// Runs to completion, panicking on a failed run.
    pub async fn run(&self, config: ValidatedConfig) -> RunOutcome {
        let outcome = self.try_run(config).await.expect("run finished");
        assert!(
            outcome.report.is_consistent(),
            "report counters do not add up: {:?}",
            outcome.report
        );
        outcome
    }

    pub fn set_latency(&self, latency: Duration) {
        self.store.set_latency(latency);
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively merges `patch` into `base`; objects merge, anything else replaces.
fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

pub fn id_selection(path: &Path) -> Value {
    json!({ "type": "id_file", "path": path, "id_format": "int" })
}

pub fn query_selection(filter: Value) -> Value {
    json!({ "type": "query", "filter": filter })
}

/// Field names of a stored document, in order.
pub fn keys(doc: &Document) -> Vec<&str> {
    doc.keys().map(String::as_str).collect()
}

/// Identifiers stored in `ns`, sorted by their text form. Batches finish in
/// any order, so insertion order says nothing.
pub fn ids_in(store: &InMemoryStore, ns: &Namespace) -> Vec<DocId> {
    let mut ids: Vec<DocId> = store
        .documents(ns)
        .iter()
        .filter_map(|d| DocId::from_document(d).ok())
        .collect();
    ids.sort_by_cached_key(ToString::to_string);
    ids
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
