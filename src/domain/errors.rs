//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for the versions endpoint
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid query mode: {mode}")]
    InvalidQueryMode { mode: String },

    #[error("Invalid input for field {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },
}
