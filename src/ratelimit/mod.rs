//! Rate limiting primitives for the auth endpoints.
//!
//! Limits are best-effort and advisory; the lockout engine remains the
//! authoritative brake on credential guessing. Policy (keys, budgets) lives
//! in [`WindowLimiter`]; the counters themselves sit behind [`CounterStore`]
//! so the backing implementation can move to a shared cache without touching
//! policy logic. The default [`MemoryCounterStore`] counts inside the
//! process, so counts reset on restart and are not shared across replicas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Login,
    PasswordReset,
    VerifyEmail,
    ResendVerification,
    AccountDeletion,
}

impl RateLimitAction {
    fn key_prefix(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
            Self::VerifyEmail => "verify_email",
            Self::ResendVerification => "resend_verification",
            Self::AccountDeletion => "account_deletion",
        }
    }

    /// Per-window request budget for a single key.
    fn limit(self) -> u32 {
        match self {
            Self::Login => 30,
            Self::PasswordReset | Self::ResendVerification => 10,
            Self::VerifyEmail => 20,
            Self::AccountDeletion => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

/// Disables rate limiting; used in tests and when no limiter is configured.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Counter storage for fixed-window counting.
///
/// Implementations must expire a key's count once `window` has elapsed since
/// its first hit in the current window.
pub trait CounterStore: Send + Sync {
    /// Count one hit against `key` and return the total inside the current window.
    fn increment(&self, key: &str, window: Duration) -> u32;
}

/// In-process [`CounterStore`].
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, WindowCounter>>,
}

#[derive(Debug)]
struct WindowCounter {
    window_start: Instant,
    count: u32,
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &str, window: Duration) -> u32 {
        let now = Instant::now();
        let mut counters = match self.counters.lock() {
            Ok(counters) => counters,
            // A poisoned lock only means another thread panicked mid-update;
            // the counters are still usable.
            Err(poisoned) => poisoned.into_inner(),
        };

        // Opportunistic cleanup keeps the map from growing without bound.
        if counters.len() > 10_000 {
            counters.retain(|_, counter| now.duration_since(counter.window_start) < window);
        }

        let counter = counters
            .entry(key.to_string())
            .or_insert(WindowCounter {
                window_start: now,
                count: 0,
            });
        if now.duration_since(counter.window_start) >= window {
            counter.window_start = now;
            counter.count = 0;
        }
        counter.count += 1;
        counter.count
    }
}

/// Fixed-window limiter over an injected [`CounterStore`].
pub struct WindowLimiter {
    window: Duration,
    store: Arc<dyn CounterStore>,
}

impl WindowLimiter {
    #[must_use]
    pub fn new(window: Duration, store: Arc<dyn CounterStore>) -> Self {
        Self { window, store }
    }

    fn check(&self, key: &str, action: RateLimitAction) -> RateLimitDecision {
        if self.store.increment(key, self.window) > action.limit() {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl Default for WindowLimiter {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(60),
            Arc::new(MemoryCounterStore::default()),
        )
    }
}

impl RateLimiter for WindowLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Requests with no resolvable client IP are not counted.
        let Some(ip) = ip else {
            return RateLimitDecision::Allowed;
        };
        self.check(&format!("{}:ip:{ip}", action.key_prefix()), action)
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check(
            &format!("{}:email:{}", action.key_prefix(), email.trim().to_lowercase()),
            action,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::PasswordReset),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_limiter_limits_after_budget() {
        let limiter = WindowLimiter::default();
        let action = RateLimitAction::AccountDeletion;
        for _ in 0..action.limit() {
            assert_eq!(
                limiter.check_ip(Some("10.0.0.1"), action),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(Some("10.0.0.1"), action),
            RateLimitDecision::Limited
        );
        // A different key still has its own budget.
        assert_eq!(
            limiter.check_ip(Some("10.0.0.2"), action),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_limiter_keys_ip_and_email_separately() {
        let limiter = WindowLimiter::default();
        let action = RateLimitAction::AccountDeletion;
        for _ in 0..action.limit() {
            limiter.check_ip(Some("10.0.0.1"), action);
        }
        assert_eq!(
            limiter.check_ip(Some("10.0.0.1"), action),
            RateLimitDecision::Limited
        );
        assert_eq!(
            limiter.check_email("user@example.com", action),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_limiter_normalizes_email_keys() {
        let limiter = WindowLimiter::default();
        let action = RateLimitAction::AccountDeletion;
        for _ in 0..action.limit() {
            limiter.check_email("User@Example.COM", action);
        }
        assert_eq!(
            limiter.check_email(" user@example.com ", action),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn window_limiter_ignores_missing_ip() {
        let limiter = WindowLimiter::default();
        for _ in 0..100 {
            assert_eq!(
                limiter.check_ip(None, RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
    }

    #[test]
    fn counter_store_resets_after_window() {
        let store = MemoryCounterStore::default();
        let window = Duration::from_millis(10);
        assert_eq!(store.increment("k", window), 1);
        assert_eq!(store.increment("k", window), 2);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.increment("k", window), 1);
    }
}
