//! Error types for Strata
//!
//! One error hierarchy shared by the instance model, the stores and the
//! metadata collection.

use thiserror::Error;

/// The main error type for Strata operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lookup Errors ==========
    #[error("Instance not known: {0}")]
    NotKnown(String),

    #[error("Entity is only stored as a proxy: {0}")]
    ProxyOnly(String),

    // ========== Status Errors ==========
    #[error("Instance is deleted: {0}")]
    AlreadyDeleted(String),

    #[error("Instance is not deleted: {0}")]
    NotDeleted(String),

    #[error("Invalid instance state: {0}")]
    InvalidState(String),

    // ========== Type Errors ==========
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Property error: {0}")]
    PropertyError(String),

    #[error("Classification error: {0}")]
    Classification(String),

    // ========== Repository Errors ==========
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Repository error: {0}")]
    Repository(String),

    // ========== Parameter Errors ==========
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // ========== Serialization Errors ==========
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the caller may retry the operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Repository(_))
    }

    /// Returns true if nothing usable was found for the requested id
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotKnown(_) | Error::ProxyOnly(_))
    }

    /// Returns true if this error is a status-transition precondition violation
    pub fn is_status_violation(&self) -> bool {
        matches!(self, Error::AlreadyDeleted(_) | Error::NotDeleted(_))
    }

    /// Shorthand for a store-side transaction conflict
    pub fn conflict_on_commit(detail: impl std::fmt::Display) -> Self {
        Error::Repository(format!("transaction conflict: {}", detail))
    }
}
