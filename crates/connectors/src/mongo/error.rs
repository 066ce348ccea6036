use crate::error::StoreError;
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};

const DUPLICATE_KEY: i32 = 11000;

// Server codes that signal a failover, a shutdown or a network hiccup.
const TRANSIENT_CODES: [i32; 13] = [
    6, 7, 89, 91, 112, 189, 262, 9001, 10107, 11600, 11602, 13435, 13436,
];

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        let message = err.to_string();

        if err.contains_label("RetryableWriteError") || err.contains_label("TransientTransactionError")
        {
            return StoreError::Transient(message);
        }

        match err.kind.as_ref() {
            ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => {
                StoreError::Transient(message)
            }
            ErrorKind::ServerSelection { .. } | ErrorKind::DnsResolve { .. } => {
                StoreError::Connection(message)
            }
            ErrorKind::Authentication { .. } => StoreError::Authentication(message),
            ErrorKind::InvalidArgument { .. } => StoreError::Invalid(message),
            ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
                StoreError::DuplicateKey(message)
            }
            ErrorKind::Write(WriteFailure::WriteConcernError(_)) => StoreError::Transient(message),
            ErrorKind::Write(_) => StoreError::Write(message),
            ErrorKind::Command(cmd) if TRANSIENT_CODES.contains(&cmd.code) => {
                StoreError::Transient(message)
            }
            ErrorKind::Command(_) => StoreError::Write(message),
            _ => StoreError::Unknown(message),
        }
    }
}
