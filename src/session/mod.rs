//! Session registrar.
//!
//! Sessions carry a random bearer token handed to the browser as a cookie;
//! the store keeps only its SHA-256 hash. Validation refreshes
//! `last_seen_at` without extending the expiry, so a session's lifetime is
//! fixed at creation. Revocation is idempotent and a revoked token can
//! never validate again.

mod repo;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SecurityError;
use crate::token::hash_token;

/// Default session lifetime.
pub const DEFAULT_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// A validated session, as seen by handlers.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Open a session for `user_id` and return the raw bearer token.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<String, SecurityError> {
    repo::insert_session(pool, user_id, ttl_seconds, ip, user_agent)
        .await
        .map_err(SecurityError::Internal)
}

/// Resolve a bearer token to its session, refreshing `last_seen_at`.
/// Returns `None` for unknown, expired, or revoked tokens alike.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn validate(pool: &PgPool, token: &str) -> Result<Option<Session>, SecurityError> {
    let token_hash = hash_token(token);
    let row = repo::lookup_session(pool, &token_hash)
        .await
        .map_err(SecurityError::Internal)?;
    Ok(row.map(|row| Session {
        user_id: row.user_id,
        expires_at: row.expires_at,
    }))
}

/// Revoke a single session by its bearer token. Idempotent.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn revoke(pool: &PgPool, token: &str) -> Result<(), SecurityError> {
    let token_hash = hash_token(token);
    repo::revoke_session(pool, &token_hash)
        .await
        .map_err(SecurityError::Internal)
}

/// Revoke every live session for `user_id`, optionally sparing the session
/// behind `except_token` (used after a password change so the caller stays
/// signed in). Returns the number of sessions revoked.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn revoke_all(
    pool: &PgPool,
    user_id: Uuid,
    except_token: Option<&str>,
) -> Result<u64, SecurityError> {
    let except_hash = except_token.map(hash_token);
    repo::revoke_all_sessions(pool, user_id, except_hash.as_deref())
        .await
        .map_err(SecurityError::Internal)
}

/// Remove sessions expired or revoked for over a day. Returns the number of
/// rows deleted.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn purge_stale(pool: &PgPool) -> Result<u64, SecurityError> {
    repo::delete_stale_sessions(pool)
        .await
        .map_err(SecurityError::Internal)
}
