// Request layer error types

use reqwest::StatusCode;
use thiserror::Error;

use crate::session::{SessionError, StoreError};

/// Result type for request layer operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the authenticated request layer
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered 401. The session has already been cleared
    #[error("Authentication required: the server rejected the session")]
    Unauthenticated,

    /// Any other non-success status, passed through for the caller to show
    #[error("Request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// No response at all (connect failure, timeout, reset)
    #[error("Failed to reach {url}: {message}")]
    Network { url: String, message: String },

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request was rejected locally before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] validator::ValidationErrors),

    /// The server returned a session we cannot hold
    #[error("Invalid session from server: {0}")]
    Session(#[from] SessionError),

    /// Persisting or clearing the session failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl ApiError {
    /// True only for server-side rejection of the credential (HTTP 401)
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }

    /// True when no response was received
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    /// HTTP status carried by this error, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthenticated => Some(StatusCode::UNAUTHORIZED),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
