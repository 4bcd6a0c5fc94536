//! Common error types for the rarity scanner

use thiserror::Error;

/// Common result type for scanner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the scanner crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding of a stored document failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error, e.g. a missing collection address.
    /// Raised before any scheduling starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run setup failed (collection supply could not be determined).
    /// Never retried; rejects the whole run.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
