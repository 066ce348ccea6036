use super::{Selected, SelectionStream, Selector};
use crate::error::SelectError;
use async_trait::async_trait;
use connectors::store::FindOptions;
use engine_core::connection::ConnectionManager;
use futures::StreamExt;
use model::{
    core::{
        document::{Bson, Document, Namespace, doc},
        identifiers::{DocId, ID_FIELD},
    },
    records::{batch::SelectedDoc, outcome::Rejection},
};
use std::sync::Arc;
use tracing::info;

/// Server-side filtered read of the source collection.
pub struct QuerySelector {
    connections: Arc<ConnectionManager>,
    ns: Namespace,
    filter: Document,
    projection: Option<Document>,
    limit: Option<i64>,
    fetch_size: Option<u32>,
}

impl QuerySelector {
    pub fn new(connections: Arc<ConnectionManager>, ns: Namespace, filter: Document) -> Self {
        Self {
            connections,
            ns,
            filter,
            projection: Some(doc! { "_id": 1 }),
            limit: None,
            fetch_size: None,
        }
    }

    /// Fields to fetch with each document. `None` fetches whole documents.
    pub fn with_projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    /// Cursor batch size hint, usually the run's batch size.
    pub fn with_fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// False when the projection only asks for `_id`.
    fn keeps_body(&self) -> bool {
        self.projection
            .as_ref()
            .is_none_or(|p| p.keys().any(|key| key != ID_FIELD))
    }
}

fn to_selected(document: Document, keep_body: bool) -> Selected {
    match DocId::from_document(&document) {
        Ok(id) if keep_body => Selected::Doc(SelectedDoc::with_document(id, document)),
        Ok(id) => Selected::Doc(SelectedDoc::id(id)),
        Err(err) => Selected::Rejected(Rejection {
            line: None,
            value: document
                .get(ID_FIELD)
                .map(|id| Bson::clone(id).into_relaxed_extjson().to_string())
                .unwrap_or_default(),
            reason: err.to_string(),
        }),
    }
}

#[async_trait]
impl Selector for QuerySelector {
    fn describe(&self) -> String {
        format!("query on {} {}", self.ns, self.filter)
    }

    async fn select(&self) -> Result<SelectionStream, SelectError> {
        let session = self.connections.acquire().await?;
        let options = FindOptions {
            projection: self.projection.clone(),
            limit: self.limit,
            batch_size: self.fetch_size,
        };
        let cursor = session.find(&self.ns, self.filter.clone(), options).await?;
        info!(namespace = %self.ns, filter = %self.filter, "Opened selection cursor");

        let keep_body = self.keeps_body();
        Ok(cursor
            .map(move |item| {
                item.map(|document| to_selected(document, keep_body))
                    .map_err(SelectError::from)
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_only_documents_are_not_kept() {
        match to_selected(doc! { "_id": 5 }, false) {
            Selected::Doc(doc) => {
                assert_eq!(doc.id, DocId::Int(5));
                assert!(doc.document.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_projected_documents_are_kept() {
        match to_selected(doc! { "_id": "k", "a": 1 }, true) {
            Selected::Doc(doc) => assert_eq!(doc.document, Some(doc! { "_id": "k", "a": 1 })),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_id_is_rejected() {
        match to_selected(doc! { "_id": 1.5, "a": 1 }, true) {
            Selected::Rejected(rejection) => {
                assert_eq!(rejection.line, None);
                assert_eq!(rejection.value, "1.5");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_select_streams_projected_documents() {
        use connectors::memory::{InMemoryStore, MemoryConnector};
        use engine_core::connection::PoolSettings;
        use futures::TryStreamExt;

        let store = Arc::new(InMemoryStore::new());
        let ns = Namespace::new("db", "items");
        store.seed(
            &ns,
            vec![
                doc! { "_id": 1, "a": 1, "b": 1 },
                doc! { "_id": 2, "b": 2 },
                doc! { "_id": 3, "a": 3 },
            ],
        );
        let connections = Arc::new(ConnectionManager::new(
            Arc::new(MemoryConnector::new(store)),
            PoolSettings::default(),
        ));

        let selector = QuerySelector::new(connections, ns, doc! { "b": { "$exists": true } })
            .with_projection(Some(doc! { "_id": 1, "a": 1 }));

        let selected: Vec<Selected> = selector.select().await.unwrap().try_collect().await.unwrap();
        assert_eq!(
            selected,
            vec![
                Selected::Doc(SelectedDoc::with_document(DocId::Int(1), doc! { "_id": 1, "a": 1 })),
                Selected::Doc(SelectedDoc::with_document(DocId::Int(2), doc! { "_id": 2 })),
            ]
        );
    }
}
