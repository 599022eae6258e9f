//! Error types for parla-core

use thiserror::Error;

/// Result type alias using parla-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in parla-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The local store failed to open; permanent for the process
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(String),

    /// Local persistence is not applicable on this platform (e.g. web builds)
    #[error("Local store is not supported on this platform")]
    UnsupportedOnPlatform,

    /// Row not found (may have been deleted concurrently)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation on create
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Upload to the remote store failed transiently; retried on the next sync trigger
    #[error("Remote upload failed: {0}")]
    RemoteUploadFailed(String),

    /// Upload was rejected by the remote store; retrying the same payload will not help
    #[error("Remote upload rejected: {0}")]
    RemoteUploadRejected(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a per-row upload failure worth retrying on a
    /// later sync pass.
    #[must_use]
    pub const fn is_retryable_upload(&self) -> bool {
        matches!(self, Self::RemoteUploadFailed(_))
    }

    /// Map a libSQL error onto `ConstraintViolation` when it reports a
    /// uniqueness failure, passing everything else through.
    pub(crate) fn from_insert(error: libsql::Error, what: &str) -> Self {
        let message = error.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::ConstraintViolation(format!("{what}: {message}"))
        } else {
            Self::LibSql(error)
        }
    }
}
