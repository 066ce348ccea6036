use connectors::error::StoreError;
use engine_core::retry::RetryDisposition;
use model::records::outcome::FailureKind;

pub fn classify_store_error(err: &StoreError) -> RetryDisposition {
    match err {
        StoreError::Connection(_) | StoreError::Transient(_) => RetryDisposition::Retry,
        StoreError::Write(_) => RetryDisposition::Stop,
        StoreError::DuplicateKey(_) => RetryDisposition::Stop,
        StoreError::Invalid(_) => RetryDisposition::Stop,
        StoreError::Authentication(_) => RetryDisposition::Stop,
        StoreError::Unknown(_) => RetryDisposition::Stop,
    }
}

/// Failure kind recorded for a document whose store call finally failed.
pub fn failure_kind(err: &StoreError) -> FailureKind {
    match err {
        StoreError::Connection(_) | StoreError::Authentication(_) => FailureKind::Connection,
        _ => FailureKind::Write,
    }
}
