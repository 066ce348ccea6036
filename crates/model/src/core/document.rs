pub use bson::{Bson, DateTime, Document, doc};

use crate::core::identifiers::ID_FIELD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Namespace {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Projection selecting `_id` plus the given fields.
pub fn projection_for<S: AsRef<str>>(fields: &[S]) -> Document {
    let mut projection = doc! { "_id": 1 };
    for field in fields {
        projection.insert(field.as_ref(), 1);
    }
    projection
}

/// Copy of `doc` reduced to `_id` and the listed fields that are present,
/// in the order they are listed.
pub fn retain_fields<S: AsRef<str>>(doc: &Document, fields: &[S]) -> Document {
    let mut out = Document::new();
    if let Some(id) = doc.get(ID_FIELD) {
        out.insert(ID_FIELD, id.clone());
    }
    for field in fields {
        let field = field.as_ref();
        if field == ID_FIELD {
            continue;
        }
        if let Some(value) = doc.get(field) {
            out.insert(field, value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retain_fields_keeps_id_first() {
        let doc = doc! { "b": 2, "_id": 1, "a": 1, "c": 3 };
        let out = retain_fields(&doc, &["c", "a", "missing"]);
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "c", "a"]);
    }

    #[test]
    fn test_projection_for() {
        assert_eq!(projection_for(&["a"]), doc! { "_id": 1, "a": 1 });
    }
}
