//! Postgres access for the auth handlers.
//!
//! Email addresses live encrypted in `email_enc` with a keyed digest in
//! `email_digest` for equality lookups; plaintext email never appears in a
//! query. Outbound mail is queued in `email_outbox` with an encrypted
//! recipient for a delivery worker to drain.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

pub(super) struct UserRow {
    pub id: Uuid,
    pub email_enc: Vec<u8>,
    pub password_hash: Option<String>,
    pub status: String,
    pub email_verified_at: Option<DateTime<Utc>>,
}

pub(super) struct UserSecrets {
    pub pin_hash: Option<String>,
    pub status: String,
}

pub(super) async fn lookup_user_by_email_digest(
    pool: &PgPool,
    email_digest: &[u8],
) -> Result<Option<UserRow>> {
    let query = r"
        SELECT id, email_enc, password_hash, status, email_verified_at
        FROM users
        WHERE email_digest = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_digest)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email digest")?;

    Ok(row.map(|row| UserRow {
        id: row.get("id"),
        email_enc: row.get("email_enc"),
        password_hash: row.get("password_hash"),
        status: row.get("status"),
        email_verified_at: row.get("email_verified_at"),
    }))
}

pub(super) async fn fetch_user_email_enc(pool: &PgPool, user_id: Uuid) -> Result<Option<Vec<u8>>> {
    let query = r"
        SELECT email_enc
        FROM users
        WHERE id = $1
          AND status = 'active'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user email")?;
    Ok(row.map(|row| row.get("email_enc")))
}

pub(super) async fn fetch_user_secrets(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserSecrets>> {
    let query = r"
        SELECT pin_hash, status
        FROM users
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user secrets")?;
    Ok(row.map(|row| UserSecrets {
        pin_hash: row.get("pin_hash"),
        status: row.get("status"),
    }))
}

pub(super) async fn update_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

pub(super) async fn mark_email_verified(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET email_verified_at = NOW(),
            status = 'active',
            updated_at = NOW()
        WHERE id = $1
          AND status = 'pending'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(())
}

/// Soft-delete the account and drop its credential hashes so they can never
/// verify again.
pub(super) async fn deactivate_user(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET status = 'deleted',
            password_hash = NULL,
            pin_hash = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to deactivate user")?;
    Ok(())
}

pub(super) async fn enqueue_email(
    pool: &PgPool,
    recipient_enc: &[u8],
    kind: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to encode email payload")?;
    let query = r"
        INSERT INTO email_outbox (recipient_enc, kind, payload)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(recipient_enc)
        .bind(kind)
        .bind(payload_text)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}
