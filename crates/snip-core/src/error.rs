use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by every storage backend.
///
/// A repeated save of an already stored URL is not an error; it is reported
/// as [`SaveOutcome::Existing`](crate::SaveOutcome::Existing).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("could not mint a free short code after {attempts} attempts")]
    CollisionExhausted { attempts: usize },
    #[error("storage backend unreachable: {0}")]
    ConnectionFailed(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Returns `true` when the backend could not be reached at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, StorageError::ConnectionFailed(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
