use thiserror::Error;

/// Errors surfaced by a document store, already classified at the driver
/// boundary so the engine never has to inspect driver internals.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The server could not be reached or selected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A failure that is expected to go away on its own (network blip,
    /// primary stepdown, write conflict).
    #[error("Transient error: {0}")]
    Transient(String),

    /// The server rejected the write.
    #[error("Write error: {0}")]
    Write(String),

    /// A unique index rejected the write.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The request itself is malformed (bad filter, bad projection).
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Transient(_))
    }
}
