use crate::core::identifiers::DocId;
use bson::Document;

/// One entry of a selection: the identifier and, when the selector
/// fetched it, the document body.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedDoc {
    pub id: DocId,
    pub document: Option<Document>,
}

impl SelectedDoc {
    pub fn id(id: DocId) -> Self {
        SelectedDoc { id, document: None }
    }

    pub fn with_document(id: DocId, document: Document) -> Self {
        SelectedDoc {
            id,
            document: Some(document),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub index: usize,
    pub items: Vec<SelectedDoc>,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Batch {
    pub fn new(index: usize, items: Vec<SelectedDoc>) -> Self {
        Batch {
            id: format!("batch-{index}"),
            index,
            items,
            ts: chrono::Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DocId> {
        self.items.iter().map(|item| &item.id)
    }
}
