//! Database access for single-use tokens.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{TokenPurpose, TokenRow};

/// Drop any live (unconsumed) tokens for the subject+purpose.
pub(super) async fn invalidate_live_tokens(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    purpose: TokenPurpose,
) -> Result<u64> {
    let query = r"
        DELETE FROM security_tokens
        WHERE subject_id = $1
          AND purpose = $2
          AND consumed_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(subject_id)
        .bind(purpose.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to invalidate live tokens")?;
    Ok(result.rows_affected())
}

pub(super) async fn insert_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    purpose: TokenPurpose,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<chrono::DateTime<chrono::Utc>> {
    let query = r"
        INSERT INTO security_tokens (subject_id, purpose, token_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        RETURNING expires_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(subject_id)
        .bind(purpose.as_str())
        .bind(token_hash)
        .bind(ttl_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert security token")?;
    Ok(row.get("expires_at"))
}

pub(super) async fn fetch_token(
    pool: &PgPool,
    token_hash: &[u8],
    purpose: TokenPurpose,
) -> Result<Option<TokenRow>> {
    let query = r"
        SELECT subject_id, expires_at, consumed_at
        FROM security_tokens
        WHERE token_hash = $1
          AND purpose = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, TokenRow>(query)
        .bind(token_hash)
        .bind(purpose.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch security token")
}

/// Atomically mark the token consumed.
///
/// The `consumed_at IS NULL` guard makes this a compare-and-set: of two
/// concurrent consumers exactly one sees a row update.
pub(super) async fn consume_token(
    pool: &PgPool,
    token_hash: &[u8],
    subject_id: Uuid,
    purpose: TokenPurpose,
) -> Result<bool> {
    let query = r"
        UPDATE security_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND purpose = $2
          AND subject_id = $3
          AND consumed_at IS NULL
          AND expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_hash)
        .bind(purpose.as_str())
        .bind(subject_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume security token")?;
    Ok(result.rows_affected() > 0)
}

/// Sweep rows that can no longer verify. A purged token is indistinguishable
/// from one that was never issued.
pub(super) async fn delete_stale_tokens(pool: &PgPool) -> Result<u64> {
    let query = r"
        DELETE FROM security_tokens
        WHERE expires_at < NOW() - INTERVAL '24 hours'
           OR consumed_at < NOW() - INTERVAL '24 hours'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep stale tokens")?;
    Ok(result.rows_affected())
}
