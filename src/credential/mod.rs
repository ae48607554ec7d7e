//! Credential hashing and constant-time verification.
//!
//! Secrets (passwords, PINs) are stored as salted Argon2id PHC strings and
//! never decryptable. Verification goes through Argon2's constant-time
//! comparison; the helpers here make sure a missing record or a malformed
//! candidate burns the same work as a real mismatch, so neither the result
//! nor the timing reveals whether an account exists.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use tracing::error;

use crate::error::SecurityError;
use crate::protect::CryptoError;

pub const PIN_MIN_DIGITS: usize = 8;
pub const PIN_MAX_DIGITS: usize = 15;
const PASSWORD_MIN_CHARS: usize = 8;

// Verified against when no stored hash exists, so the "no such record" path
// costs the same as a real mismatch.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_secret("gardi-dummy-credential").unwrap_or_default());

/// Hash a secret with Argon2id and a fresh random salt.
///
/// # Errors
/// Returns [`CryptoError::Hash`] if hashing fails.
pub fn hash_secret(secret: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CryptoError::Hash)
}

/// Verify a candidate secret against a stored PHC hash.
///
/// A wrong secret is `Ok(false)`; only a malformed stored hash is an error.
///
/// # Errors
/// Returns [`CryptoError::Hash`] if the stored hash cannot be parsed.
pub fn verify_hash(candidate: &str, stored_hash: &str) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| CryptoError::Hash)?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(CryptoError::Hash),
    }
}

/// Verify a candidate against an optional stored hash.
///
/// When the record is missing (or its hash is unreadable) a dummy hash is
/// verified instead, so callers cannot distinguish "no such record" from
/// "wrong secret" by result or timing.
#[must_use]
pub fn verify_or_dummy(candidate: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(stored) => match verify_hash(candidate, stored) {
            Ok(matched) => matched,
            Err(err) => {
                error!("Stored credential hash is unreadable: {err}");
                false
            }
        },
        None => {
            let _ = verify_hash(candidate, &DUMMY_HASH);
            false
        }
    }
}

/// Verify a password candidate: shape check first, then the hash comparison.
///
/// A malformed candidate is a plain mismatch (it still counts as a failed
/// attempt for lockout purposes) and burns a dummy verification to keep the
/// timing in line with the real comparison.
#[must_use]
pub fn verify_password(candidate: &str, stored_hash: Option<&str>) -> bool {
    if validate_new_password(candidate).is_err() {
        let _ = verify_hash(candidate, &DUMMY_HASH);
        return false;
    }
    verify_or_dummy(candidate, stored_hash)
}

/// Verify a PIN candidate: length/digit check first, then the comparison.
#[must_use]
pub fn verify_pin(candidate: &str, stored_hash: Option<&str>) -> bool {
    if validate_new_pin(candidate).is_err() {
        let _ = verify_hash(candidate, &DUMMY_HASH);
        return false;
    }
    verify_or_dummy(candidate, stored_hash)
}

/// Check password composition rules for enrollment and reset.
///
/// # Errors
/// Returns [`SecurityError::Validation`] naming the first unmet requirement.
pub fn validate_new_password(password: &str) -> Result<(), SecurityError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(SecurityError::Validation(format!(
            "Password must be at least {PASSWORD_MIN_CHARS} characters"
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(SecurityError::Validation(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(SecurityError::Validation(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(SecurityError::Validation(
            "Password must contain at least one digit".to_string(),
        ));
    }
    if password.chars().all(char::is_alphanumeric) {
        return Err(SecurityError::Validation(
            "Password must contain at least one special character".to_string(),
        ));
    }
    Ok(())
}

/// Check PIN shape: 8 to 15 ASCII digits.
///
/// # Errors
/// Returns [`SecurityError::Validation`] when the shape is wrong.
pub fn validate_new_pin(pin: &str) -> Result<(), SecurityError> {
    let all_digits = pin.chars().all(|c| c.is_ascii_digit());
    if !all_digits || pin.len() < PIN_MIN_DIGITS || pin.len() > PIN_MAX_DIGITS {
        return Err(SecurityError::Validation(format!(
            "PIN must be {PIN_MIN_DIGITS} to {PIN_MAX_DIGITS} digits"
        )));
    }
    Ok(())
}
