//! Common error types for rangecoach

use thiserror::Error;

/// Common result type for rangecoach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across rangecoach services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Object store read/write error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Inference service connection or protocol error
    #[error("Inference service error: {0}")]
    Inference(String),

    /// Frame aggregation failure for one evidence file
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
