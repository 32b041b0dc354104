//! Error types for pran-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Server error type, mapped onto HTTP statuses by [`IntoResponse`]
#[derive(Debug, Error)]
pub enum Error {
    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with the current session (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// pran-common error
    #[error(transparent)]
    Common(#[from] pran_common::Error),
}

/// Convenience Result type using pran-server Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Common(inner) => match inner {
                pran_common::Error::NotFound(_) => StatusCode::NOT_FOUND,
                pran_common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                pran_common::Error::InvalidTransition(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
