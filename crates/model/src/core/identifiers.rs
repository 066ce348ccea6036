use bson::{Bson, Document, oid::ObjectId};
use serde::{Deserialize, Serialize, Serializer};
use std::{fmt, sync::Arc};
use thiserror::Error;

pub const ID_FIELD: &str = "_id";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Arc<str>);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// Fresh random run id, `run-<uuid>`.
    pub fn generate() -> Self {
        Self::new(format!("run-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Textual format expected for identifiers read from an id list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFormat {
    #[default]
    ObjectId,
    String,
    Int,
}

impl fmt::Display for IdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdFormat::ObjectId => write!(f, "ObjectId"),
            IdFormat::String => write!(f, "string"),
            IdFormat::Int => write!(f, "integer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("'{value}' is not a valid {format} identifier")]
    Malformed { value: String, format: IdFormat },

    #[error("unsupported identifier type: {0}")]
    UnsupportedType(String),

    #[error("document has no _id field")]
    Missing,
}

/// Identifier of a document (`_id`).
///
/// Only the identifier types the maintenance runs can address are supported;
/// any other `_id` type is reported as a rejection at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    ObjectId(ObjectId),
    String(String),
    Int(i64),
}

impl DocId {
    /// Parses a single identifier as written in an id list.
    pub fn parse(raw: &str, format: IdFormat) -> Result<Self, IdentifierError> {
        let malformed = || IdentifierError::Malformed {
            value: raw.to_string(),
            format,
        };

        match format {
            IdFormat::ObjectId => ObjectId::parse_str(raw)
                .map(DocId::ObjectId)
                .map_err(|_| malformed()),
            IdFormat::Int => raw.parse::<i64>().map(DocId::Int).map_err(|_| malformed()),
            IdFormat::String => {
                if raw.is_empty() || raw.chars().any(char::is_whitespace) {
                    Err(malformed())
                } else {
                    Ok(DocId::String(raw.to_string()))
                }
            }
        }
    }

    pub fn from_bson(value: &Bson) -> Result<Self, IdentifierError> {
        match value {
            Bson::ObjectId(oid) => Ok(DocId::ObjectId(*oid)),
            Bson::String(s) => Ok(DocId::String(s.clone())),
            Bson::Int32(i) => Ok(DocId::Int(i64::from(*i))),
            Bson::Int64(i) => Ok(DocId::Int(*i)),
            other => Err(IdentifierError::UnsupportedType(format!(
                "{:?}",
                other.element_type()
            ))),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, IdentifierError> {
        doc.get(ID_FIELD)
            .ok_or(IdentifierError::Missing)
            .and_then(Self::from_bson)
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            DocId::ObjectId(oid) => Bson::ObjectId(*oid),
            DocId::String(s) => Bson::String(s.clone()),
            DocId::Int(i) => Bson::Int64(*i),
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
            DocId::String(s) => f.write_str(s),
            DocId::Int(i) => write!(f, "{i}"),
        }
    }
}

// Identifiers are written as plain text so failure lists can be fed back
// into an id-list run unchanged.
impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_parse_object_id() {
        let id = DocId::parse("65f1c0ffee0000000000beef", IdFormat::ObjectId).unwrap();
        assert_eq!(id.to_string(), "65f1c0ffee0000000000beef");
    }

    #[test]
    fn test_parse_rejects_malformed_object_id() {
        let err = DocId::parse("not-an-oid", IdFormat::ObjectId).unwrap_err();
        assert!(matches!(err, IdentifierError::Malformed { .. }));
    }

    #[test]
    fn test_parse_int_and_string() {
        assert_eq!(DocId::parse("42", IdFormat::Int).unwrap(), DocId::Int(42));
        assert!(DocId::parse("4 2", IdFormat::String).is_err());
        assert_eq!(
            DocId::parse("sku-1", IdFormat::String).unwrap(),
            DocId::String("sku-1".into())
        );
    }

    #[test]
    fn test_from_document_normalises_int32() {
        let doc = doc! { "_id": 7_i32, "a": 1 };
        assert_eq!(DocId::from_document(&doc).unwrap(), DocId::Int(7));
    }

    #[test]
    fn test_from_document_rejects_unsupported_type() {
        let doc = doc! { "_id": { "nested": true } };
        assert!(matches!(
            DocId::from_document(&doc),
            Err(IdentifierError::UnsupportedType(_))
        ));
        assert_eq!(
            DocId::from_document(&doc! { "a": 1 }),
            Err(IdentifierError::Missing)
        );
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&DocId::Int(5)).unwrap();
        assert_eq!(json, "\"5\"");
    }
}
