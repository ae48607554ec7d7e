//! Field protection codec: tiered encryption and hashing for PII.
//!
//! Tiers, strongest first:
//! - [`Tier::Max`] (government identifiers): ChaCha20-Poly1305 under a
//!   per-record subkey derived from the epoch key with a fresh random salt,
//!   plus a fresh nonce. Never reused, never searchable.
//! - [`Tier::Strong`] (email, phone): ChaCha20-Poly1305 with a fresh nonce;
//!   callers store a companion searchable digest so the column stays
//!   lookup-able by equality.
//! - [`Tier::Basic`] (name, location): ChaCha20-Poly1305 with a fresh nonce.
//! - [`Tier::HashOnly`] (system secrets): salted Argon2id, never decryptable.
//!
//! Ciphertext layout is `epoch(1) [salt(16) Max only] nonce(12) ct||tag`.
//! The tier label rides in the AEAD associated data, so decrypting under the
//! wrong tier fails authentication instead of yielding garbage.

pub mod digest;
pub mod keyring;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;

pub use keyring::Keyring;

const EPOCH_LEN: usize = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const AAD_PREFIX: &str = "gardi:field:v1";
const MAX_SUBKEY_LABEL: &[u8] = b"gardi:max-subkey:v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failure")]
    Encrypt,
    #[error("decryption failure")]
    Decrypt,
    #[error("ciphertext truncated")]
    Truncated,
    #[error("unknown key epoch {0}")]
    UnknownEpoch(u8),
    #[error("tier is hash-only and cannot be decrypted")]
    NotDecryptable,
    #[error("hashing failure")]
    Hash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Max,
    Strong,
    Basic,
    HashOnly,
}

impl Tier {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Strong => "strong",
            Self::Basic => "basic",
            Self::HashOnly => "hash",
        }
    }
}

/// An encrypted (or hashed) field as stored in the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedField {
    bytes: Vec<u8>,
}

impl ProtectedField {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

pub struct FieldCodec {
    keyring: Keyring,
    digest_key: Vec<u8>,
}

impl FieldCodec {
    #[must_use]
    pub fn new(keyring: Keyring, digest_key: Vec<u8>) -> Self {
        Self {
            keyring,
            digest_key,
        }
    }

    /// Encrypt (or hash) `plaintext` at the given tier.
    ///
    /// Encryption is non-deterministic: every call draws a fresh nonce (and,
    /// for [`Tier::Max`], a fresh key-derivation salt).
    ///
    /// # Errors
    /// Returns [`CryptoError`] if the AEAD or hash operation fails.
    pub fn protect(&self, plaintext: &str, tier: Tier) -> Result<ProtectedField, CryptoError> {
        match tier {
            Tier::HashOnly => {
                let phc = crate::credential::hash_secret(plaintext)?;
                Ok(ProtectedField::from_bytes(phc.into_bytes()))
            }
            Tier::Max => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                let subkey = derive_subkey(self.keyring.active_key(), &salt);
                let (nonce, ciphertext) = seal(&subkey, tier, plaintext.as_bytes())?;

                let mut out = Vec::with_capacity(
                    EPOCH_LEN + SALT_LEN + NONCE_LEN + ciphertext.len(),
                );
                out.push(self.keyring.active_epoch());
                out.extend_from_slice(&salt);
                out.extend_from_slice(&nonce);
                out.extend_from_slice(&ciphertext);
                Ok(ProtectedField::from_bytes(out))
            }
            Tier::Strong | Tier::Basic => {
                let (nonce, ciphertext) = seal(self.keyring.active_key(), tier, plaintext.as_bytes())?;

                let mut out = Vec::with_capacity(EPOCH_LEN + NONCE_LEN + ciphertext.len());
                out.push(self.keyring.active_epoch());
                out.extend_from_slice(&nonce);
                out.extend_from_slice(&ciphertext);
                Ok(ProtectedField::from_bytes(out))
            }
        }
    }

    /// Decrypt a protected field produced at the given tier.
    ///
    /// # Errors
    /// Fails on hash-only tiers, truncated or tampered input, a tier
    /// mismatch (the tier is authenticated), or an unknown key epoch.
    pub fn unprotect(&self, field: &ProtectedField, tier: Tier) -> Result<String, CryptoError> {
        if tier == Tier::HashOnly {
            return Err(CryptoError::NotDecryptable);
        }

        let bytes = field.as_bytes();
        let (&epoch, rest) = bytes.split_first().ok_or(CryptoError::Truncated)?;
        let key = self
            .keyring
            .key(epoch)
            .ok_or(CryptoError::UnknownEpoch(epoch))?;

        let (key, rest) = if tier == Tier::Max {
            if rest.len() < SALT_LEN {
                return Err(CryptoError::Truncated);
            }
            let (salt, rest) = rest.split_at(SALT_LEN);
            (derive_subkey(key, salt), rest)
        } else {
            (*key, rest)
        };

        if rest.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let plaintext = open(&key, tier, nonce, ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Deterministic digest of `plaintext` for equality lookups.
    #[must_use]
    pub fn digest(&self, plaintext: &str) -> Vec<u8> {
        digest::searchable_digest(&self.digest_key, plaintext)
    }
}

fn aad(tier: Tier) -> Vec<u8> {
    format!("{AAD_PREFIX}|{}", tier.label()).into_bytes()
}

fn derive_subkey(epoch_key: &[u8; keyring::KEY_LEN], salt: &[u8]) -> [u8; keyring::KEY_LEN] {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(epoch_key).unwrap_or_else(|_| unreachable!());
    mac.update(MAX_SUBKEY_LABEL);
    mac.update(salt);
    mac.finalize().into_bytes().into()
}

fn seal(
    key: &[u8; keyring::KEY_LEN],
    tier: Tier,
    plaintext: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad(tier);
    let payload = Payload {
        msg: plaintext,
        aad: &aad,
    };
    let ciphertext = cipher.encrypt(nonce, payload).map_err(|_| CryptoError::Encrypt)?;
    Ok((nonce_bytes, ciphertext))
}

fn open(
    key: &[u8; keyring::KEY_LEN],
    tier: Tier,
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let aad = aad(tier);
    let payload = Payload {
        msg: ciphertext,
        aad: &aad,
    };
    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::Decrypt)
}
