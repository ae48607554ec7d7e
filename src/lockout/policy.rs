//! Per-action-class lockout policies and escalation arithmetic.
//!
//! Each sensitive workflow carries its own policy instance; the constants are
//! intentionally independent, not one shared table. Current values, for
//! auditors:
//!
//! | action class             | max attempts | window | base lock | multiplier | cap  |
//! |--------------------------|--------------|--------|-----------|------------|------|
//! | `password_reset_request` | 3            | 1 h    | 24 h      | 2          | 30 d |
//! | `account_deletion`       | 3            | 1 h    | 24 h      | 2          | 7 d  |
//! | `credential_login`       | 5            | 15 min | 15 min    | 2          | 24 h |

use chrono::{DateTime, Duration, Utc};

/// A category of sensitive operation with independent lockout bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionClass {
    PasswordResetRequest,
    AccountDeletion,
    CredentialLogin,
}

impl ActionClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PasswordResetRequest => "password_reset_request",
            Self::AccountDeletion => "account_deletion",
            Self::CredentialLogin => "credential_login",
        }
    }

    /// Classes whose lock transition also revokes the subject's sessions.
    /// Reset-request abuse does not: the requester need not hold a session,
    /// and the lock alone stops the workflow.
    #[must_use]
    pub const fn revokes_sessions_on_lock(self) -> bool {
        matches!(self, Self::AccountDeletion | Self::CredentialLogin)
    }

    #[must_use]
    pub fn policy(self) -> LockoutPolicy {
        match self {
            Self::PasswordResetRequest => LockoutPolicy {
                max_attempts: 3,
                window: Duration::hours(1),
                base_lock: Duration::hours(24),
                multiplier: 2,
                cap: Duration::days(30),
            },
            Self::AccountDeletion => LockoutPolicy {
                max_attempts: 3,
                window: Duration::hours(1),
                base_lock: Duration::hours(24),
                multiplier: 2,
                cap: Duration::days(7),
            },
            Self::CredentialLogin => LockoutPolicy {
                max_attempts: 5,
                window: Duration::minutes(15),
                base_lock: Duration::minutes(15),
                multiplier: 2,
                cap: Duration::hours(24),
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    pub max_attempts: i64,
    pub window: Duration,
    pub base_lock: Duration,
    pub multiplier: u32,
    pub cap: Duration,
}

impl LockoutPolicy {
    /// Lock duration for the nth lockout: `min(base * multiplier^(n-1), cap)`.
    ///
    /// Saturates at the cap for any overflow, so an absurd `lockout_count`
    /// can never produce a shorter-than-intended or negative duration.
    #[must_use]
    pub fn lock_duration(&self, lockout_count: u32) -> Duration {
        let exponent = lockout_count.saturating_sub(1);
        let Some(factor) = i64::from(self.multiplier).checked_pow(exponent) else {
            return self.cap;
        };
        match self.base_lock.num_seconds().checked_mul(factor) {
            Some(seconds) if seconds < self.cap.num_seconds() => Duration::seconds(seconds),
            _ => self.cap,
        }
    }
}

/// Pure escalation decision, serialized by the caller per (subject, class).
///
/// `recent_failures` must already include the failure being recorded.
/// Returns the new `(lockout_count, locked_until)` when the state machine
/// transitions or extends a lock, `None` when the subject stays unlocked.
#[must_use]
pub fn evaluate_failure(
    policy: &LockoutPolicy,
    lockout_count: i32,
    locked_until: Option<DateTime<Utc>>,
    recent_failures: i64,
    now: DateTime<Utc>,
) -> Option<(i32, DateTime<Utc>)> {
    let currently_locked = locked_until.is_some_and(|until| now < until);

    if !currently_locked && recent_failures < policy.max_attempts {
        return None;
    }

    // Either the threshold was reached, or the attempt arrived during an
    // active lock (continued abuse): escalate and extend.
    let next_count = lockout_count.saturating_add(1);
    let duration = policy.lock_duration(next_count.unsigned_abs());
    Some((next_count, now + duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_policy() -> LockoutPolicy {
        ActionClass::PasswordResetRequest.policy()
    }

    #[test]
    fn first_lock_uses_base_duration() {
        // BASE=24h, MULTIPLIER=2, CAP=30d, MAX_ATTEMPTS=3
        let policy = reset_policy();
        assert_eq!(policy.lock_duration(1), Duration::hours(24));
    }

    #[test]
    fn second_lock_doubles() {
        let policy = reset_policy();
        assert_eq!(policy.lock_duration(2), Duration::hours(48));
    }

    #[test]
    fn duration_never_exceeds_cap() {
        let policy = reset_policy();
        assert_eq!(policy.lock_duration(6), Duration::days(30));
        assert_eq!(policy.lock_duration(u32::MAX), Duration::days(30));
    }

    #[test]
    fn deletion_cap_is_shorter_than_reset_cap() {
        let deletion = ActionClass::AccountDeletion.policy();
        assert_eq!(deletion.lock_duration(10), Duration::days(7));
        assert!(deletion.lock_duration(10) < reset_policy().lock_duration(10));
    }

    #[test]
    fn under_threshold_stays_unlocked() {
        let now = Utc::now();
        assert!(evaluate_failure(&reset_policy(), 0, None, 2, now).is_none());
    }

    #[test]
    fn threshold_triggers_first_lock() {
        let now = Utc::now();
        let (count, until) =
            evaluate_failure(&reset_policy(), 0, None, 3, now).expect("locks at threshold");
        assert_eq!(count, 1);
        assert_eq!(until, now + Duration::hours(24));
    }

    #[test]
    fn second_escalation_doubles_lock() {
        let now = Utc::now();
        // First lock expired, three fresh failures in the window.
        let expired = Some(now - Duration::minutes(5));
        let (count, until) =
            evaluate_failure(&reset_policy(), 1, expired, 3, now).expect("locks again");
        assert_eq!(count, 2);
        assert_eq!(until, now + Duration::hours(48));
    }

    #[test]
    fn attempt_while_locked_extends_the_lock() {
        let now = Utc::now();
        let active = Some(now + Duration::hours(10));
        // A single failure during an active lock escalates regardless of the
        // windowed count.
        let (count, until) =
            evaluate_failure(&reset_policy(), 1, active, 1, now).expect("extends");
        assert_eq!(count, 2);
        assert_eq!(until, now + Duration::hours(48));
    }

    #[test]
    fn repeated_attempts_during_a_lock_keep_extending() {
        let policy = reset_policy();
        let now = Utc::now();
        // First lock is active; each further attempt increments the count
        // and pushes the deadline out again.
        let mut count = 1;
        let mut until = now + Duration::hours(24);
        for expected in [Duration::hours(48), Duration::days(4), Duration::days(8)] {
            let (next_count, next_until) =
                evaluate_failure(&policy, count, Some(until), 1, now).expect("extends");
            assert_eq!(next_count, count + 1);
            assert_eq!(next_until, now + expected);
            count = next_count;
            until = next_until;
        }
    }

    #[test]
    fn escalation_saturates_at_cap() {
        let now = Utc::now();
        let active = Some(now + Duration::hours(1));
        let (_, until) =
            evaluate_failure(&reset_policy(), 40, active, 1, now).expect("extends");
        assert_eq!(until, now + Duration::days(30));
    }

    #[test]
    fn class_labels_are_stable() {
        assert_eq!(ActionClass::PasswordResetRequest.as_str(), "password_reset_request");
        assert_eq!(ActionClass::AccountDeletion.as_str(), "account_deletion");
        assert_eq!(ActionClass::CredentialLogin.as_str(), "credential_login");
    }

    #[test]
    fn session_revocation_classes() {
        assert!(ActionClass::CredentialLogin.revokes_sessions_on_lock());
        assert!(ActionClass::AccountDeletion.revokes_sessions_on_lock());
        assert!(!ActionClass::PasswordResetRequest.revokes_sessions_on_lock());
    }
}
