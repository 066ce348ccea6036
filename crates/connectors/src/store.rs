use crate::error::StoreError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use model::core::{
    document::{Document, Namespace},
    identifiers::DocId,
};
use std::sync::Arc;

/// Lazy, single-pass sequence of documents returned by a query.
pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub limit: Option<i64>,
    pub batch_size: Option<u32>,
}

impl FindOptions {
    pub fn projected(projection: Document) -> Self {
        FindOptions {
            projection: Some(projection),
            ..Default::default()
        }
    }
}

/// A single write addressed to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteIntent {
    /// Inserts a new document. An existing `_id` yields [`WriteOutcome::AlreadyExists`].
    Insert { ns: Namespace, document: Document },
    /// Replaces the document with the given id.
    Replace {
        ns: Namespace,
        id: DocId,
        document: Document,
        upsert: bool,
    },
    /// `$set` of the given fields.
    Set {
        ns: Namespace,
        id: DocId,
        fields: Document,
    },
    /// `$unset` of the given fields.
    Unset {
        ns: Namespace,
        id: DocId,
        fields: Vec<String>,
    },
    Delete { ns: Namespace, id: DocId },
}

impl WriteIntent {
    pub fn namespace(&self) -> &Namespace {
        match self {
            WriteIntent::Insert { ns, .. }
            | WriteIntent::Replace { ns, .. }
            | WriteIntent::Set { ns, .. }
            | WriteIntent::Unset { ns, .. }
            | WriteIntent::Delete { ns, .. } => ns,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            WriteIntent::Insert { .. } => "insert",
            WriteIntent::Replace { .. } => "replace",
            WriteIntent::Set { .. } => "set",
            WriteIntent::Unset { .. } => "unset",
            WriteIntent::Delete { .. } => "delete",
        }
    }
}

/// What a write actually did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The document matched but the write changed nothing.
    Unchanged,
    /// No document with the addressed id exists.
    NotFound,
    /// An insert hit an existing `_id`.
    AlreadyExists,
}

/// A session on a document database. Implementations are cheap to share
/// across tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> Result<DocumentStream, StoreError>;

    async fn find_one(
        &self,
        ns: &Namespace,
        id: &DocId,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError>;

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64, StoreError>;

    async fn apply(&self, intent: &WriteIntent) -> Result<WriteOutcome, StoreError>;
}

/// Opens sessions against one database endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Endpoint description safe for logs (no credentials).
    fn describe(&self) -> String;

    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError>;
}
