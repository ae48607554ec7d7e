//! Key material indexed by epoch.
//!
//! Even with a single epoch configured, every ciphertext records the epoch it
//! was sealed under so key rotation is additive: load the new epoch, flip the
//! active id, old records keep decrypting.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use std::collections::HashMap;

pub const KEY_LEN: usize = 32;

pub struct Keyring {
    keys: HashMap<u8, [u8; KEY_LEN]>,
    active: u8,
    // Held separately so the active key is available without a map lookup
    // that would need a fallback value.
    active_key: [u8; KEY_LEN],
}

impl Keyring {
    /// Build a keyring from explicit epoch/key pairs.
    ///
    /// # Errors
    /// Returns an error if no keys are given or the active epoch is missing.
    pub fn new(active: u8, keys: HashMap<u8, [u8; KEY_LEN]>) -> Result<Self> {
        if keys.is_empty() {
            return Err(anyhow!("keyring requires at least one epoch key"));
        }
        let Some(active_key) = keys.get(&active).copied() else {
            return Err(anyhow!("active epoch {active} has no key material"));
        };
        Ok(Self {
            keys,
            active,
            active_key,
        })
    }

    /// Parse a keyring from its CLI form: `epoch=base64key[,epoch=base64key...]`.
    ///
    /// # Errors
    /// Returns an error on malformed pairs, bad base64, or wrong key length.
    pub fn from_spec(spec: &str, active: u8) -> Result<Self> {
        let mut keys = HashMap::new();
        for pair in spec.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (epoch, encoded) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected epoch=key pair, got {pair:?}"))?;
            let epoch: u8 = epoch
                .trim()
                .parse()
                .with_context(|| format!("invalid key epoch {epoch:?}"))?;
            let bytes = Base64::decode_vec(encoded.trim())
                .map_err(|_| anyhow!("epoch {epoch}: key is not valid base64"))?;
            let key: [u8; KEY_LEN] = bytes
                .try_into()
                .map_err(|_| anyhow!("epoch {epoch}: key must be {KEY_LEN} bytes"))?;
            if keys.insert(epoch, key).is_some() {
                return Err(anyhow!("epoch {epoch} listed twice"));
            }
        }
        Self::new(active, keys)
    }

    #[must_use]
    pub const fn active_epoch(&self) -> u8 {
        self.active
    }

    #[must_use]
    pub const fn active_key(&self) -> &[u8; KEY_LEN] {
        &self.active_key
    }

    #[must_use]
    pub fn key(&self, epoch: u8) -> Option<&[u8; KEY_LEN]> {
        self.keys.get(&epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64, Encoding};

    fn encoded(byte: u8) -> String {
        Base64::encode_string(&[byte; KEY_LEN])
    }

    #[test]
    fn from_spec_parses_multiple_epochs() {
        let spec = format!("0={},1={}", encoded(1), encoded(2));
        let ring = Keyring::from_spec(&spec, 1).expect("keyring should parse");
        assert_eq!(ring.active_epoch(), 1);
        assert_eq!(ring.active_key(), &[2u8; KEY_LEN]);
        assert_eq!(ring.key(0), Some(&[1u8; KEY_LEN]));
        assert_eq!(ring.key(9), None);
    }

    #[test]
    fn from_spec_rejects_missing_active_epoch() {
        let spec = format!("0={}", encoded(1));
        assert!(Keyring::from_spec(&spec, 3).is_err());
    }

    #[test]
    fn from_spec_rejects_short_keys() {
        let short = Base64::encode_string(&[7u8; 16]);
        assert!(Keyring::from_spec(&format!("0={short}"), 0).is_err());
    }

    #[test]
    fn from_spec_rejects_duplicate_epochs() {
        let spec = format!("0={},0={}", encoded(1), encoded(2));
        assert!(Keyring::from_spec(&spec, 0).is_err());
    }

    #[test]
    fn empty_spec_is_an_error() {
        assert!(Keyring::from_spec("", 0).is_err());
    }

    #[test]
    fn active_key_is_the_configured_material() {
        let ring = Keyring::new(2, [(2, [5u8; KEY_LEN])].into()).expect("keyring");
        assert_eq!(ring.active_key(), &[5u8; KEY_LEN]);
        assert_eq!(Some(ring.active_key()), ring.key(ring.active_epoch()));
        assert_ne!(ring.active_key(), &[0u8; KEY_LEN]);
    }
}
