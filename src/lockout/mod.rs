//! Lockout escalation engine.
//!
//! State machine per (subject, action class): `UNLOCKED -> LOCKED ->
//! UNLOCKED`. Failures append events and are counted inside the policy's
//! trailing window; reaching the threshold (or failing again while locked)
//! escalates `lockout_count` and extends `locked_until`, capped per class.
//! [`is_locked`] must be checked before any credential comparison, so a
//! correct secret presented during a lock is rejected without being
//! evaluated.
//!
//! Counter updates serialize on a `SELECT ... FOR UPDATE` row lock, so
//! parallel failures cannot both read a stale under-threshold count.

pub mod format;
pub mod policy;
mod repo;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::SecurityError;

pub use format::format_remaining;
pub use policy::{ActionClass, LockoutPolicy};

/// Current lock state for a (subject, action class).
#[derive(Clone, Copy, Debug)]
pub struct LockStatus {
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockStatus {
    const UNLOCKED: Self = Self {
        locked: false,
        locked_until: None,
    };
}

/// Result of recording one failure.
#[derive(Clone, Copy, Debug)]
pub struct FailureOutcome {
    pub status: LockStatus,
    /// True when this failure caused a fresh lock or extended an active one.
    pub escalated: bool,
}

/// Record a failed attempt and run the escalation decision.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn record_failure(
    pool: &PgPool,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<FailureOutcome, SecurityError> {
    let policy = class.policy();

    let mut tx = pool.begin().await?;
    repo::ensure_record(&mut tx, subject_id, class)
        .await
        .map_err(SecurityError::Internal)?;
    let row = repo::lock_record(&mut tx, subject_id, class)
        .await
        .map_err(SecurityError::Internal)?;
    repo::insert_failed_attempt(&mut tx, subject_id, class)
        .await
        .map_err(SecurityError::Internal)?;
    let recent = repo::count_recent_failures(
        &mut tx,
        subject_id,
        class,
        policy.window.num_seconds(),
    )
    .await
    .map_err(SecurityError::Internal)?;

    let now = Utc::now();
    let decision = policy::evaluate_failure(&policy, row.lockout_count, row.locked_until, recent, now);

    let outcome = match decision {
        Some((lockout_count, locked_until)) => {
            repo::apply_escalation(&mut tx, subject_id, class, lockout_count, locked_until)
                .await
                .map_err(SecurityError::Internal)?;
            warn!(
                subject_id = %subject_id,
                action_class = class.as_str(),
                lockout_count,
                locked_until = %locked_until,
                "Subject locked out"
            );
            FailureOutcome {
                status: LockStatus {
                    locked: true,
                    locked_until: Some(locked_until),
                },
                escalated: true,
            }
        }
        None => FailureOutcome {
            status: LockStatus {
                locked: row.locked_until.is_some_and(|until| now < until),
                locked_until: row.locked_until,
            },
            escalated: false,
        },
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Check the lock state; callers gate credential comparisons on this.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn is_locked(
    pool: &PgPool,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<LockStatus, SecurityError> {
    let row = repo::fetch_record(pool, subject_id, class)
        .await
        .map_err(SecurityError::Internal)?;
    Ok(match row {
        Some(row) => {
            let locked = row.locked_until.is_some_and(|until| Utc::now() < until);
            LockStatus {
                locked,
                locked_until: row.locked_until.filter(|_| locked),
            }
        }
        None => LockStatus::UNLOCKED,
    })
}

/// Clear the failure history after a successful verification while unlocked.
/// An active lock is never cleared this way.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn clear_on_success(
    pool: &PgPool,
    subject_id: Uuid,
    class: ActionClass,
) -> Result<(), SecurityError> {
    repo::clear_unlocked(pool, subject_id, class)
        .await
        .map_err(SecurityError::Internal)
}

/// Drop failure events older than any class's counting window. Lock state
/// itself is untouched; only the raw event rows are swept. Returns the
/// number of rows deleted.
///
/// # Errors
/// Returns [`SecurityError::Internal`] on store failures.
pub async fn prune_stale_attempts(pool: &PgPool) -> Result<u64, SecurityError> {
    repo::delete_stale_attempts(pool)
        .await
        .map_err(SecurityError::Internal)
}

/// Turn a lock state into the caller-facing error, with a human-readable
/// remaining duration.
#[must_use]
pub fn locked_error(locked_until: DateTime<Utc>) -> SecurityError {
    SecurityError::Locked { locked_until }
}

/// Render the message shown for an active lock.
#[must_use]
pub fn locked_message(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "Too many failed attempts. Try again in {}.",
        format_remaining(locked_until - now)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn locked_message_includes_breakdown() {
        let now = Utc::now();
        let message = locked_message(now + Duration::hours(24), now);
        assert_eq!(message, "Too many failed attempts. Try again in 1 day.");
    }

    #[test]
    fn locked_error_carries_deadline() {
        let until = Utc::now() + Duration::hours(2);
        match locked_error(until) {
            SecurityError::Locked { locked_until } => assert_eq!(locked_until, until),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
