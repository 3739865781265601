// Error types for session construction and persistence

use thiserror::Error;

/// Errors raised while building a session from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A session must always carry a bearer credential
    #[error("Session token must not be empty")]
    EmptyToken,

    /// Role string outside the closed set of known roles
    #[error("Invalid role: {0}")]
    InvalidRole(String),
}

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be encoded
    #[error("Session storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
