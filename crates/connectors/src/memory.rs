//! In-process document store used by tests and dry rehearsals.
//!
//! Supports the subset of query operators the maintenance runs rely on
//! (equality, `$exists`, `$eq`, `$ne`, `$in`, `$nin`, `$gt`/`$gte`/`$lt`/`$lte`,
//! `$and`, `$or`) and include-style projections. Faults and latency can be
//! injected per namespace, identifier and call.

use crate::{
    error::StoreError,
    store::{Connector, DocumentStore, DocumentStream, FindOptions, WriteIntent, WriteOutcome},
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use model::core::{
    document::{Bson, Document, Namespace, retain_fields},
    identifiers::{DocId, ID_FIELD},
};
use parking_lot::Mutex;
use std::{
    cmp::Ordering as CmpOrdering,
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Fails with [`StoreError::Transient`].
    Transient,
    /// Fails with [`StoreError::Write`].
    Permanent,
    /// Panics inside the call.
    Panic,
}

/// A scripted failure. Unset filters match everything.
#[derive(Debug, Clone)]
pub struct Fault {
    kind: FaultKind,
    ns: Option<Namespace>,
    id: Option<DocId>,
    verb: Option<&'static str>,
    remaining: Option<u32>,
}

impl Fault {
    pub fn new(kind: FaultKind) -> Self {
        Fault {
            kind,
            ns: None,
            id: None,
            verb: None,
            remaining: None,
        }
    }

    pub fn in_namespace(mut self, ns: Namespace) -> Self {
        self.ns = Some(ns);
        self
    }

    pub fn for_id(mut self, id: DocId) -> Self {
        self.id = Some(id);
        self
    }

    /// Restricts the fault to one call: a write verb (`insert`, `set`, ...)
    /// or `find_one`.
    pub fn on(mut self, verb: &'static str) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Fires only the first `n` times it matches.
    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, ns: &Namespace, id: &DocId, verb: &str) -> bool {
        self.ns.as_ref().is_none_or(|n| n == ns)
            && self.id.as_ref().is_none_or(|i| i == id)
            && self.verb.is_none_or(|v| v == verb)
            && self.remaining.is_none_or(|n| n > 0)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<Namespace, Vec<Document>>>,
    faults: Mutex<Vec<Fault>>,
    latency: Mutex<Option<Duration>>,
    down: AtomicBool,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, ns: &Namespace, documents: impl IntoIterator<Item = Document>) {
        self.collections
            .lock()
            .entry(ns.clone())
            .or_default()
            .extend(documents);
    }

    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.collections.lock().get(ns).cloned().unwrap_or_default()
    }

    pub fn get(&self, ns: &Namespace, id: &DocId) -> Option<Document> {
        self.collections
            .lock()
            .get(ns)
            .and_then(|docs| docs.iter().find(|d| has_id(d, id)).cloned())
    }

    pub fn len(&self, ns: &Namespace) -> usize {
        self.collections.lock().get(ns).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, ns: &Namespace) -> bool {
        self.len(ns) == 0
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Makes every `ping` fail until called again with `false`.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(&self.active);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn check_fault(&self, ns: &Namespace, id: &DocId, verb: &str) -> Result<(), StoreError> {
        let kind = {
            let mut faults = self.faults.lock();
            let Some(fault) = faults.iter_mut().find(|f| f.matches(ns, id, verb)) else {
                return Ok(());
            };
            if let Some(n) = fault.remaining.as_mut() {
                *n -= 1;
            }
            fault.kind
        };

        let message = format!("injected {verb} fault on {ns} for {id}");
        match kind {
            FaultKind::Transient => Err(StoreError::Transient(message)),
            FaultKind::Permanent => Err(StoreError::Write(message)),
            FaultKind::Panic => panic!("{message}"),
        }
    }

    fn write(&self, intent: &WriteIntent) -> Result<WriteOutcome, StoreError> {
        let mut collections = self.collections.lock();
        let docs = collections.entry(intent.namespace().clone()).or_default();

        match intent {
            WriteIntent::Insert { document, .. } => {
                let id = DocId::from_document(document)
                    .map_err(|e| StoreError::Invalid(e.to_string()))?;
                if docs.iter().any(|d| has_id(d, &id)) {
                    return Ok(WriteOutcome::AlreadyExists);
                }
                docs.push(document.clone());
                Ok(WriteOutcome::Applied)
            }
            WriteIntent::Replace {
                id,
                document,
                upsert,
                ..
            } => {
                let mut replacement = Document::new();
                replacement.insert(
                    ID_FIELD,
                    document.get(ID_FIELD).cloned().unwrap_or_else(|| id.to_bson()),
                );
                for (key, value) in document {
                    if key != ID_FIELD {
                        replacement.insert(key.as_str(), value.clone());
                    }
                }
                match docs.iter_mut().find(|d| has_id(d, id)) {
                    Some(existing) if *existing == replacement => Ok(WriteOutcome::Unchanged),
                    Some(existing) => {
                        *existing = replacement;
                        Ok(WriteOutcome::Applied)
                    }
                    None if *upsert => {
                        docs.push(replacement);
                        Ok(WriteOutcome::Applied)
                    }
                    None => Ok(WriteOutcome::NotFound),
                }
            }
            WriteIntent::Set { id, fields, .. } => {
                let Some(existing) = docs.iter_mut().find(|d| has_id(d, id)) else {
                    return Ok(WriteOutcome::NotFound);
                };
                let mut changed = false;
                for (key, value) in fields {
                    if existing.get(key) != Some(value) {
                        existing.insert(key.as_str(), value.clone());
                        changed = true;
                    }
                }
                Ok(if changed {
                    WriteOutcome::Applied
                } else {
                    WriteOutcome::Unchanged
                })
            }
            WriteIntent::Unset { id, fields, .. } => {
                let Some(existing) = docs.iter_mut().find(|d| has_id(d, id)) else {
                    return Ok(WriteOutcome::NotFound);
                };
                let removed = fields
                    .iter()
                    .filter(|f| existing.remove(f.as_str()).is_some())
                    .count();
                Ok(if removed > 0 {
                    WriteOutcome::Applied
                } else {
                    WriteOutcome::Unchanged
                })
            }
            WriteIntent::Delete { id, .. } => match docs.iter().position(|d| has_id(d, id)) {
                Some(index) => {
                    docs.remove(index);
                    Ok(WriteOutcome::Applied)
                }
                None => Ok(WriteOutcome::NotFound),
            },
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store is down".into()));
        }
        Ok(())
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> Result<DocumentStream, StoreError> {
        let _active = self.enter().await;
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .map_or(usize::MAX, |l| l as usize);

        let docs: Vec<Document> = {
            let collections = self.collections.lock();
            collections
                .get(ns)
                .map(|docs| {
                    docs.iter()
                        .filter(|d| matches_filter(d, &filter))
                        .take(limit)
                        .map(|d| project(d, options.projection.as_ref()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(stream::iter(docs.into_iter().map(Ok)).boxed())
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        id: &DocId,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        let _active = self.enter().await;
        self.check_fault(ns, id, "find_one")?;
        Ok(self
            .get(ns, id)
            .map(|doc| project(&doc, projection.as_ref())))
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64, StoreError> {
        let _active = self.enter().await;
        let collections = self.collections.lock();
        Ok(collections.get(ns).map_or(0, |docs| {
            docs.iter().filter(|d| matches_filter(d, &filter)).count() as u64
        }))
    }

    async fn apply(&self, intent: &WriteIntent) -> Result<WriteOutcome, StoreError> {
        let _active = self.enter().await;
        if let Some(id) = intent_id(intent) {
            self.check_fault(intent.namespace(), &id, intent.verb())?;
        }
        self.write(intent)
    }
}

fn intent_id(intent: &WriteIntent) -> Option<DocId> {
    match intent {
        WriteIntent::Insert { document, .. } => DocId::from_document(document).ok(),
        WriteIntent::Replace { id, .. }
        | WriteIntent::Set { id, .. }
        | WriteIntent::Unset { id, .. }
        | WriteIntent::Delete { id, .. } => Some(id.clone()),
    }
}

fn has_id(doc: &Document, id: &DocId) -> bool {
    DocId::from_document(doc).is_ok_and(|d| d == *id)
}

fn project(doc: &Document, projection: Option<&Document>) -> Document {
    let Some(projection) = projection else {
        return doc.clone();
    };
    let fields: Vec<&str> = projection
        .iter()
        .filter(|(key, value)| key.as_str() != ID_FIELD && is_truthy(value))
        .map(|(key, _)| key.as_str())
        .collect();
    let mut out = retain_fields(doc, &fields);
    if projection.get(ID_FIELD).is_some_and(|v| !is_truthy(v)) {
        out.remove(ID_FIELD);
    }
    out
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<CmpOrdering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

/// Equality against a field also matches array elements, as the server does.
fn field_equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(v) => values_equal(v, expected),
        None => matches!(expected, Bson::Null),
    }
}

fn in_list(value: Option<&Bson>, list: &Bson) -> bool {
    match list {
        Bson::Array(items) => items.iter().any(|item| field_equals(value, item)),
        _ => false,
    }
}

fn matches_operators(value: Option<&Bson>, operators: &Document) -> bool {
    operators.iter().all(|(op, arg)| match op.as_str() {
        "$exists" => value.is_some() == is_truthy(arg),
        "$eq" => field_equals(value, arg),
        "$ne" => !field_equals(value, arg),
        "$in" => in_list(value, arg),
        "$nin" => !in_list(value, arg),
        "$gt" => value.and_then(|v| compare(v, arg)) == Some(CmpOrdering::Greater),
        "$gte" => matches!(
            value.and_then(|v| compare(v, arg)),
            Some(CmpOrdering::Greater | CmpOrdering::Equal)
        ),
        "$lt" => value.and_then(|v| compare(v, arg)) == Some(CmpOrdering::Less),
        "$lte" => matches!(
            value.and_then(|v| compare(v, arg)),
            Some(CmpOrdering::Less | CmpOrdering::Equal)
        ),
        _ => false,
    })
}

fn clauses(arg: &Bson) -> Vec<&Document> {
    match arg {
        Bson::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Bson::Document(d) => Some(d),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => clauses(condition).iter().all(|c| matches_filter(doc, c)),
        "$or" => clauses(condition).iter().any(|c| matches_filter(doc, c)),
        path => {
            let value = lookup(doc, path);
            match condition {
                Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                    matches_operators(value, ops)
                }
                expected => field_equals(value, expected),
            }
        }
    })
}

/// Hands out the same in-memory store to every session. The first
/// `fail_first` connection attempts fail with a connection error.
pub struct MemoryConnector {
    store: Arc<InMemoryStore>,
    fail_first: AtomicU32,
    connects: AtomicU32,
}

impl MemoryConnector {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        MemoryConnector {
            store,
            fail_first: AtomicU32::new(0),
            connects: AtomicU32::new(0),
        }
    }

    pub fn failing_first(self, attempts: u32) -> Self {
        self.fail_first.store(attempts, Ordering::SeqCst);
        self
    }

    /// Number of successful connections handed out.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Connection("connection refused".into()));
        }
        self.store.ping().await?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone() as Arc<dyn DocumentStore>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use model::core::document::doc;

    fn ns() -> Namespace {
        Namespace::new("db", "items")
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.seed(
            &ns(),
            vec![
                doc! { "_id": 1, "status": "new", "n": 5, "tags": ["a", "b"] },
                doc! { "_id": 2, "status": "done", "n": 10 },
                doc! { "_id": 3, "n": 15, "meta": { "src": "x" } },
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_find_with_operators() {
        let store = store();
        let found: Vec<Document> = store
            .find(&ns(), doc! { "status": { "$exists": false } }, FindOptions::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert_eq!(store.count(&ns(), doc! { "n": { "$gte": 10 } }).await.unwrap(), 2);
        assert_eq!(store.count(&ns(), doc! { "tags": "b" }).await.unwrap(), 1);
        assert_eq!(store.count(&ns(), doc! { "meta.src": "x" }).await.unwrap(), 1);
        assert_eq!(
            store
                .count(&ns(), doc! { "$or": [ { "_id": 1 }, { "_id": 3_i64 } ] })
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .count(&ns(), doc! { "status": { "$in": ["new", "done"] } })
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_find_projection_and_limit() {
        let store = store();
        let options = FindOptions {
            projection: Some(doc! { "_id": 1 }),
            limit: Some(2),
            batch_size: None,
        };
        let found: Vec<Document> = store
            .find(&ns(), doc! {}, options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found, vec![doc! { "_id": 1 }, doc! { "_id": 2 }]);
    }

    #[tokio::test]
    async fn test_write_outcomes() {
        let store = store();
        let insert = WriteIntent::Insert {
            ns: ns(),
            document: doc! { "_id": 1 },
        };
        assert_eq!(store.apply(&insert).await.unwrap(), WriteOutcome::AlreadyExists);

        let set = WriteIntent::Set {
            ns: ns(),
            id: DocId::Int(2),
            fields: doc! { "status": "done" },
        };
        assert_eq!(store.apply(&set).await.unwrap(), WriteOutcome::Unchanged);

        let unset = WriteIntent::Unset {
            ns: ns(),
            id: DocId::Int(2),
            fields: vec!["status".into()],
        };
        assert_eq!(store.apply(&unset).await.unwrap(), WriteOutcome::Applied);
        assert_eq!(store.apply(&unset).await.unwrap(), WriteOutcome::Unchanged);

        let delete = WriteIntent::Delete {
            ns: ns(),
            id: DocId::Int(9),
        };
        assert_eq!(store.apply(&delete).await.unwrap(), WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_fault_fires_limited_times() {
        let store = store();
        store.inject(
            Fault::new(FaultKind::Transient)
                .for_id(DocId::Int(1))
                .on("delete")
                .times(1),
        );
        let delete = WriteIntent::Delete {
            ns: ns(),
            id: DocId::Int(1),
        };
        assert!(matches!(
            store.apply(&delete).await,
            Err(StoreError::Transient(_))
        ));
        assert_eq!(store.apply(&delete).await.unwrap(), WriteOutcome::Applied);
    }

    #[tokio::test]
    async fn test_connector_fails_first_attempts() {
        let connector = MemoryConnector::new(Arc::new(InMemoryStore::new())).failing_first(2);
        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.connects(), 1);
    }
}
