//! Admin bearer-token authentication
//!
//! The admin token is never stored in clear: the settings table holds the
//! lowercase hex SHA-256 digest under [`ADMIN_TOKEN_DIGEST_KEY`]. When neither the
//! configuration nor the database carries one, a random token is generated and
//! handed back once so the server can log it at startup.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the admin token digest
pub const ADMIN_TOKEN_DIGEST_KEY: &str = "admin_token_sha256";

/// Generated token length
const TOKEN_LEN: usize = 32;

/// Authentication failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No `Authorization: Bearer` header present
    MissingToken,

    /// Header present but malformed
    MalformedHeader,

    /// Token digest does not match
    InvalidToken,

    /// Database error loading the digest
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingToken => write!(f, "Missing bearer token"),
            ApiAuthError::MalformedHeader => write!(f, "Malformed Authorization header"),
            ApiAuthError::InvalidToken => write!(f, "Invalid admin token"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

/// Hex SHA-256 digest of a token
///
/// ```
/// use pran_common::api::digest_token;
///
/// let digest = digest_token("letmein");
/// assert_eq!(digest.len(), 64);
/// assert_eq!(digest, digest_token("letmein"));
/// ```
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Random alphanumeric admin token
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Extract the token from an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, ApiAuthError> {
    let value = header.ok_or(ApiAuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or(ApiAuthError::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(ApiAuthError::MalformedHeader);
    }
    Ok(token)
}

/// Compare a presented token against the stored digest
///
/// Compares digests byte by byte without early exit.
pub fn token_matches(token: &str, expected_digest: &str) -> bool {
    let provided = digest_token(token);
    if provided.len() != expected_digest.len() {
        return false;
    }
    provided
        .bytes()
        .zip(expected_digest.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Resolve the admin token digest
///
/// - A configured token always wins and its digest replaces the stored one.
/// - Otherwise the stored digest is used.
/// - Otherwise a new token is generated; its digest is stored and the plain token
///   returned as the second tuple element so the caller can log it once.
#[cfg(feature = "sqlx")]
pub async fn load_or_init_admin_digest(
    db: &SqlitePool,
    configured: Option<&str>,
) -> Result<(String, Option<String>), ApiAuthError> {
    use crate::db::settings::{get_setting, set_setting};

    if let Some(token) = configured.filter(|t| !t.is_empty()) {
        let digest = digest_token(token);
        set_setting(db, ADMIN_TOKEN_DIGEST_KEY, &digest)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;
        return Ok((digest, None));
    }

    let stored: Option<String> = get_setting(db, ADMIN_TOKEN_DIGEST_KEY)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    if let Some(digest) = stored.filter(|d| !d.is_empty()) {
        return Ok((digest, None));
    }

    let token = generate_token();
    let digest = digest_token(&token);
    set_setting(db, ADMIN_TOKEN_DIGEST_KEY, &digest)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok((digest, Some(token)))
}
