//! Database access for lockout records and failed-attempt events.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::policy::ActionClass;

#[derive(Debug, sqlx::FromRow)]
pub(super) struct LockRow {
    pub(super) lockout_count: i32,
    pub(super) locked_until: Option<DateTime<Utc>>,
}

/// Make sure the lockout row exists so it can be locked `FOR UPDATE`.
pub(super) async fn ensure_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<()> {
    let query = r"
        INSERT INTO lockout_records (subject_id, action_class)
        VALUES ($1, $2)
        ON CONFLICT (subject_id, action_class) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject_id)
        .bind(class.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to ensure lockout record")?;
    Ok(())
}

/// Read the lockout row under a row lock, serializing concurrent failures
/// for the same (subject, action class).
pub(super) async fn lock_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<LockRow> {
    let query = r"
        SELECT lockout_count, locked_until
        FROM lockout_records
        WHERE subject_id = $1
          AND action_class = $2
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, LockRow>(query)
        .bind(subject_id)
        .bind(class.as_str())
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lock lockout record")
}

pub(super) async fn insert_failed_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<()> {
    let query = r"
        INSERT INTO failed_attempts (subject_id, action_class, attempted_at)
        VALUES ($1, $2, NOW())
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject_id)
        .bind(class.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert failed attempt")?;
    Ok(())
}

/// Count failures inside the trailing window, including the one just written.
pub(super) async fn count_recent_failures(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    class: ActionClass,
    window_seconds: i64,
) -> Result<i64> {
    let query = r"
        SELECT COUNT(*) AS failures
        FROM failed_attempts
        WHERE subject_id = $1
          AND action_class = $2
          AND attempted_at > NOW() - ($3 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(subject_id)
        .bind(class.as_str())
        .bind(window_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to count recent failures")?;
    Ok(row.get("failures"))
}

pub(super) async fn apply_escalation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    class: ActionClass,
    lockout_count: i32,
    locked_until: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        UPDATE lockout_records
        SET lockout_count = $3,
            locked_until = $4
        WHERE subject_id = $1
          AND action_class = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject_id)
        .bind(class.as_str())
        .bind(lockout_count)
        .bind(locked_until)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to apply lockout escalation")?;
    Ok(())
}

pub(super) async fn fetch_record(
    pool: &PgPool,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<Option<LockRow>> {
    let query = r"
        SELECT lockout_count, locked_until
        FROM lockout_records
        WHERE subject_id = $1
          AND action_class = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, LockRow>(query)
        .bind(subject_id)
        .bind(class.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch lockout record")
}

/// Sweep failure events that have aged out of every class's counting window.
pub(super) async fn delete_stale_attempts(pool: &PgPool) -> Result<u64> {
    let query = r"
        DELETE FROM failed_attempts
        WHERE attempted_at < NOW() - INTERVAL '24 hours'
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
        .context("failed to delete stale attempts")?;
    Ok(result.rows_affected())
}

/// Reset bookkeeping after a successful verification, guarded so an active
/// lock is never cleared by a racing success.
pub(super) async fn clear_unlocked(
    pool: &PgPool,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin lockout clear")?;

    let query = r"
        DELETE FROM failed_attempts
        WHERE subject_id = $1
          AND action_class = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject_id)
        .bind(class.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear failed attempts")?;

    let query = r"
        UPDATE lockout_records
        SET lockout_count = 0,
            locked_until = NULL
        WHERE subject_id = $1
          AND action_class = $2
          AND (locked_until IS NULL OR locked_until <= NOW())
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject_id)
        .bind(class.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to reset lockout record")?;

    tx.commit().await.context("commit lockout clear")?;
    Ok(())
}
