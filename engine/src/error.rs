//! Error types for the FarmaSync engine.

use crate::EntityId;
use thiserror::Error;

/// Failure reported by a remote document store for a single mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed document does not exist (partial update of a missing document).
    #[error("document not found: {0}")]
    NotFound(EntityId),

    /// The store could not be reached or answered with a server-side failure.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The caller is not allowed to write this document.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The store refused the mutation as malformed.
    #[error("mutation rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether retrying the same mutation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// All possible errors from the FarmaSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Local storage errors
    #[error("local storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Remote errors
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    // Setup errors
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
