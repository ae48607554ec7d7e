//! Deterministic searchable digests over protected fields.
//!
//! The digest is a keyed one-way function of the normalized plaintext: equal
//! logical values always collide so encrypted columns stay lookup-able by
//! equality, and the key keeps the digest non-invertible and non-enumerable
//! offline. The digest key is independent of the field-key epochs so rotating
//! field keys never breaks existing lookup indexes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DIGEST_LEN: usize = 32;

/// Normalize plaintext before digesting: trim and case-fold.
#[must_use]
pub fn normalize(plaintext: &str) -> String {
    plaintext.trim().to_lowercase()
}

/// Compute the searchable digest of `plaintext` under `key`.
#[must_use]
pub fn searchable_digest(key: &[u8], plaintext: &str) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(normalize(plaintext).as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = &[9u8; 32];

    #[test]
    fn digest_is_stable_across_normalized_variants() {
        let a = searchable_digest(KEY, "Agent@Example.COM ");
        let b = searchable_digest(KEY, "  agent@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_LEN);
    }

    #[test]
    fn digest_differs_for_distinct_values() {
        let a = searchable_digest(KEY, "agent@example.com");
        let b = searchable_digest(KEY, "agent2@example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn digest_depends_on_key() {
        let a = searchable_digest(KEY, "agent@example.com");
        let b = searchable_digest(&[8u8; 32], "agent@example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize(" Alice Smith "), "alice smith");
    }
}
