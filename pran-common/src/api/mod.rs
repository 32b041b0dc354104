//! Shared HTTP API helpers
//!
//! Contains only pure functions and database operations. Each service wraps
//! them with its own axum middleware.

pub mod auth;

pub use auth::{
    bearer_token, digest_token, generate_token, token_matches, ApiAuthError,
    ADMIN_TOKEN_DIGEST_KEY,
};

#[cfg(feature = "sqlx")]
pub use auth::load_or_init_admin_digest;
