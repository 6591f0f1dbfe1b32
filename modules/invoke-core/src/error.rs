//! Typed errors for the registry and its collaborator services.

use thiserror::Error;

/// Raised while assembling `InvocationServices`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A required collaborator was never supplied to the builder
    #[error("missing service: {0}")]
    MissingService(&'static str),
}

/// Errors returned by collaborator services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Lookup by id/name found nothing
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Path escapes the storage root or is otherwise unusable
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Payload failed validation before being stored
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Processor was started twice
    #[error("processor already running")]
    AlreadyRunning,

    /// Queue has no producers left
    #[error("queue closed")]
    QueueClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl From<invoke_common::ShapeMismatch> for ServiceError {
    fn from(e: invoke_common::ShapeMismatch) -> Self {
        ServiceError::InvalidData(e.to_string())
    }
}

/// Result type alias for collaborator operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
