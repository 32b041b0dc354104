//! Bearer-token middleware for admin routes
//!
//! Applied to protected routes only; `/health` and the device surfaces do not
//! use it.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use pran_common::api::{bearer_token, token_matches, ApiAuthError};

use crate::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = bearer_token(header).map_err(AuthError::from)?;
    if !token_matches(token, &state.admin_digest) {
        warn!("Rejected admin request to {}", request.uri().path());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    MalformedHeader,
    InvalidToken,
    Other(String),
}

impl From<ApiAuthError> for AuthError {
    fn from(err: ApiAuthError) -> Self {
        match err {
            ApiAuthError::MissingToken => AuthError::MissingToken,
            ApiAuthError::MalformedHeader => AuthError::MalformedHeader,
            ApiAuthError::InvalidToken => AuthError::InvalidToken,
            ApiAuthError::DatabaseError(msg) => AuthError::Other(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()),
            AuthError::MalformedHeader => (
                StatusCode::BAD_REQUEST,
                "Malformed Authorization header".to_string(),
            ),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid admin token".to_string()),
            AuthError::Other(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication error: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
