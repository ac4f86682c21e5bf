//! Application layer error types

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Resource not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

/// Errors raised by the product and license store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache operation failed: {message}")]
    Operation { message: String },
}

impl ApplicationError {
    /// Get the error type as a string for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            ApplicationError::Domain(DomainError::InvalidQueryMode { .. }) => "invalid_query",
            ApplicationError::Domain(DomainError::InvalidInput { .. }) => "invalid_input",
            ApplicationError::Domain(DomainError::NotFound { .. }) => "not_found",
            ApplicationError::Store(_) => "store_error",
            ApplicationError::Cache(_) => "cache_error",
            ApplicationError::Configuration { .. } => "configuration_error",
            ApplicationError::Io(_) => "io_error",
            ApplicationError::Json(_) => "json_error",
            ApplicationError::NotFound { .. } => "not_found",
        }
    }
}
