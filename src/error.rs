//! Error types for floop-core.

use thiserror::Error;

/// Result type alias using floop-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input was missing, ill-typed, or empty after sanitization
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No entity exists for the given identifier
    #[error("Not found: {kind} '{id}'")]
    NotFound { kind: &'static str, id: String },

    /// An operation was attempted in a state that forbids it
    #[error("State violation: {0}")]
    StateViolation(String),

    /// Graph storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Snapshot framing or checksum failure
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A resource is held by another invocation
    #[error("Resource locked: {0}")]
    Locked(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Semantic analyzer failure (never fatal on the main path)
    #[error("Semantic analyzer error: {0}")]
    Semantic(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for an entity kind and id.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a state-violation error.
    pub fn state_violation(message: impl Into<String>) -> Self {
        Self::StateViolation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }
}
