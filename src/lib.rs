//! # Gardi (Protected Data & Account Security Core)
//!
//! `gardi` is the protected-data and account-security core behind the identity
//! portal. It owns everything that touches secrets at rest or gates access to
//! an account.
//!
//! ## Protected Fields
//!
//! Sensitive columns (email addresses, recovery material) are sealed with
//! `ChaCha20-Poly1305` under epoch-tagged keys. Every ciphertext records the
//! key epoch it was written under, so rotation is additive: load a new epoch,
//! flip the active id, old rows keep decrypting. Lookups never see plaintext;
//! searchable columns store a keyed `HMAC-SHA-256` digest of the normalized
//! value instead.
//!
//! ## Account Security
//!
//! - **Credentials:** Argon2id hashes only; unknown accounts burn a dummy
//!   verification so timing does not reveal existence.
//! - **Single-use tokens:** password reset and email verification tokens are
//!   stored as SHA-256 digests and consumed with a compare-and-set, so a token
//!   spends exactly once even under concurrent redemption.
//! - **Lockout:** repeated failures escalate through timed locks per action
//!   class; the reusable window and thresholds live in one policy table.
//! - **Enumeration resistance:** endpoints that take an email answer the same
//!   way whether or not the account exists.

pub mod api;
pub mod cli;
pub mod credential;
pub mod error;
pub mod lockout;
pub mod protect;
pub mod ratelimit;
pub mod session;
pub mod token;

pub use api::{APP_USER_AGENT, GIT_COMMIT_HASH};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
