//! Common error types for Pran

use thiserror::Error;

/// Common result type for Pran operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Pran services and devices
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
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

    /// Catalog content violates its ordering or size rules
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Phase transition rejected because it would break session invariants
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Dispatch Bus transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
