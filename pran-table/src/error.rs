//! Error types for pran-table

use thiserror::Error;

/// Main error type for the table runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Errors surfaced by the shared library (bus, election, config)
    #[error(transparent)]
    Common(#[from] pran_common::Error),

    /// Catalog HTTP request failures
    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog answered with something unusable
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Clip file could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio output failures
    #[error("Audio output error: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, Error>;
