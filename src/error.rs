//! Error types for the relay.

use thiserror::Error;

/// Main error type for relay operations.
///
/// Cloneable so a single failure can be replayed to every deferred call
/// and embedded inline in per-document bulk-get results.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Document id is missing")]
    MissingId,

    #[error("Only reserved document ids may start with an underscore: {0}")]
    ReservedId(String),

    #[error("Document not found: {id} ({reason})")]
    NotFound { id: String, reason: String },

    #[error("Store error ({status}): {message}")]
    Store { status: u16, message: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Task queue dropped before settling")]
    QueueClosed,
}

impl RelayError {
    /// HTTP-style status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            RelayError::MissingId
            | RelayError::ReservedId(_)
            | RelayError::BadRequest(_) => 400,
            RelayError::NotFound { .. } => 404,
            RelayError::Store { status, .. } => *status,
            RelayError::InitFailed(_) | RelayError::QueueClosed => 500,
        }
    }

    /// Convenience constructor for a missing document.
    pub fn missing(id: impl Into<String>) -> Self {
        RelayError::NotFound {
            id: id.into(),
            reason: "missing".to_string(),
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
