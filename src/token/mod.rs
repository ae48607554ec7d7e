//! Single-use, expiring, subject-bound tokens.
//!
//! One manager covers every token purpose (password reset, email
//! verification) with one canonical subject identity: the account UUID. Raw
//! tokens are returned to the caller exactly once; the database only ever
//! sees a SHA-256 hash, so a stolen table cannot be replayed.

pub mod models;
mod repo;

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SecurityError;

pub use models::{IssuedToken, TokenPurpose};

const TOKEN_BYTES: usize = 32;

/// Generate a high-entropy URL-safe token.
///
/// # Errors
/// Returns [`SecurityError::Internal`] if the system RNG fails.
pub fn generate_token() -> Result<String, SecurityError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| SecurityError::internal(anyhow::anyhow!("rng failure: {err}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a raw token for storage and lookups.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Issue a fresh token, invalidating any prior live token for the same
/// subject and purpose (at most one live token per subject per purpose).
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn issue(
    pool: &PgPool,
    subject_id: Uuid,
    purpose: TokenPurpose,
    ttl_seconds: i64,
) -> Result<IssuedToken, SecurityError> {
    let token = generate_token()?;
    let token_hash = hash_token(&token);

    let mut tx = pool.begin().await?;
    repo::invalidate_live_tokens(&mut tx, subject_id, purpose)
        .await
        .map_err(SecurityError::Internal)?;
    let expires_at = repo::insert_token(&mut tx, subject_id, purpose, &token_hash, ttl_seconds)
        .await
        .map_err(SecurityError::Internal)?;
    tx.commit().await?;

    Ok(IssuedToken { token, expires_at })
}

/// Resolve a raw token to the subject it was issued to, regardless of its
/// state. Flows whose requests carry only the token use this to learn the
/// subject before consuming.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn lookup_subject(
    pool: &PgPool,
    token: &str,
    purpose: TokenPurpose,
) -> Result<Option<Uuid>, SecurityError> {
    let row = repo::fetch_token(pool, &hash_token(token), purpose)
        .await
        .map_err(SecurityError::Internal)?;
    Ok(row.map(|row| row.subject_id))
}

/// Classify a token presentation without consuming it.
///
/// Checks run in a fixed order: existence, subject binding, single-use
/// state, expiry. Callers map every failure to one generic user-facing
/// message; the precise variant is for logs and control flow only.
///
/// # Errors
/// `NotFound`, `SubjectMismatch`, `AlreadyUsed`, `Expired`, or `Internal`.
pub async fn verify(
    pool: &PgPool,
    token: &str,
    subject_id: Uuid,
    purpose: TokenPurpose,
) -> Result<(), SecurityError> {
    let row = repo::fetch_token(pool, &hash_token(token), purpose)
        .await
        .map_err(SecurityError::Internal)?;
    classify(row.as_ref(), subject_id, Utc::now())
}

/// Consume a token: atomic conditional update on `consumed_at`.
///
/// Two concurrent consumes of the same token resolve to exactly one success;
/// the loser gets the precise failure it raced into (usually `AlreadyUsed`).
///
/// # Errors
/// Same set as [`verify`].
pub async fn consume(
    pool: &PgPool,
    token: &str,
    subject_id: Uuid,
    purpose: TokenPurpose,
) -> Result<(), SecurityError> {
    let token_hash = hash_token(token);
    if repo::consume_token(pool, &token_hash, subject_id, purpose)
        .await
        .map_err(SecurityError::Internal)?
    {
        return Ok(());
    }

    // The conditional update matched nothing; re-read to say why.
    let row = repo::fetch_token(pool, &token_hash, purpose)
        .await
        .map_err(SecurityError::Internal)?;
    match classify(row.as_ref(), subject_id, Utc::now()) {
        // Lost the race between our update and the re-read.
        Ok(()) => Err(SecurityError::AlreadyUsed),
        Err(err) => Err(err),
    }
}

/// Remove tokens that can no longer verify. Safe to run from a periodic
/// sweep; verification never depends on it.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn purge_stale(pool: &PgPool) -> Result<u64, SecurityError> {
    repo::delete_stale_tokens(pool)
        .await
        .map_err(SecurityError::Internal)
}

fn classify(
    row: Option<&models::TokenRow>,
    subject_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), SecurityError> {
    let Some(row) = row else {
        return Err(SecurityError::NotFound);
    };
    if row.subject_id != subject_id {
        return Err(SecurityError::SubjectMismatch);
    }
    if row.consumed_at.is_some() {
        return Err(SecurityError::AlreadyUsed);
    }
    if now >= row.expires_at {
        return Err(SecurityError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::models::TokenRow;
    use super::*;
    use chrono::Duration;

    fn row(subject: Uuid, expires_in: i64, consumed: bool) -> TokenRow {
        let now = Utc::now();
        TokenRow {
            subject_id: subject,
            expires_at: now + Duration::seconds(expires_in),
            consumed_at: consumed.then_some(now),
        }
    }

    #[test]
    fn generated_tokens_are_high_entropy_and_unique() {
        let a = generate_token().expect("token");
        let b = generate_token().expect("token");
        assert_ne!(a, b);
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(a.as_bytes())
            .expect("base64url");
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn token_hash_is_stable_and_sha256_sized() {
        assert_eq!(hash_token("token"), hash_token("token"));
        assert_ne!(hash_token("token"), hash_token("other"));
        assert_eq!(hash_token("token").len(), 32);
    }

    #[test]
    fn classify_missing_row_is_not_found() {
        let err = classify(None, Uuid::new_v4(), Utc::now()).expect_err("not found");
        assert!(matches!(err, SecurityError::NotFound));
    }

    #[test]
    fn classify_checks_subject_before_state() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        // Consumed AND expired for someone else: subject mismatch wins.
        let row = row(owner, -10, true);
        let err = classify(Some(&row), stranger, Utc::now()).expect_err("mismatch");
        assert!(matches!(err, SecurityError::SubjectMismatch));
    }

    #[test]
    fn classify_reports_already_used_before_expired() {
        let owner = Uuid::new_v4();
        let row = row(owner, -10, true);
        let err = classify(Some(&row), owner, Utc::now()).expect_err("used");
        assert!(matches!(err, SecurityError::AlreadyUsed));
    }

    #[test]
    fn classify_reports_expired() {
        let owner = Uuid::new_v4();
        let row = row(owner, -1, false);
        let err = classify(Some(&row), owner, Utc::now()).expect_err("expired");
        assert!(matches!(err, SecurityError::Expired));
    }

    #[test]
    fn classify_accepts_live_token_for_owner() {
        let owner = Uuid::new_v4();
        let row = row(owner, 600, false);
        assert!(classify(Some(&row), owner, Utc::now()).is_ok());
    }
}
