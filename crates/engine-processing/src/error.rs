use connectors::error::StoreError;
use engine_core::error::ConnectionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("Failed to read id list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid identifier on line {line}: '{value}' ({reason})")]
    InvalidIdentifier {
        line: usize,
        value: String,
        reason: String,
    },

    #[error("Store error while selecting: {0}")]
    Store(#[from] StoreError),

    #[error("Connection error while selecting: {0}")]
    Connection(#[from] ConnectionError),
}

#[derive(Error, Debug)]
pub enum MutationError {
    /// The mutation spec cannot be turned into an operation.
    #[error("Invalid mutation: {0}")]
    Invalid(String),

    /// A rename target already exists and the collision policy forbids overwriting it.
    #[error("Rename collision: field '{to}' already exists (renaming '{from}')")]
    Collision { from: String, to: String },

    #[error("Store error while preparing mutation: {0}")]
    Store(#[from] StoreError),

    #[error("Connection error while preparing mutation: {0}")]
    Connection(#[from] ConnectionError),
}

#[derive(Error, Debug)]
pub enum ReportWriteError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DedupeError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document dump: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Document dump must be a JSON array of objects")]
    NotAnArray,

    #[error("Failed to serialize duplicate groups: {0}")]
    Serialization(#[source] serde_json::Error),
}
