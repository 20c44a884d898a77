//! Armadillo key verification and object decryption

use tracing::trace;

use crate::salsa;
use crate::{Error, Result};

/// Salsa20 key length in the on-disk blob.
pub const ARMADILLO_KEY_SIZE: usize = salsa::KEY_SIZE;

/// Trailing digest length: the first 4 bytes of MD5(key).
pub const ARMADILLO_DIGEST_SIZE: usize = 4;

/// A verified Armadillo decryption key.
#[derive(Clone)]
pub struct ArmadilloKey {
    key: [u8; ARMADILLO_KEY_SIZE],
}

impl ArmadilloKey {
    /// Load a key from its 20-byte on-disk blob, verifying the digest.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != ARMADILLO_KEY_SIZE + ARMADILLO_DIGEST_SIZE {
            return Err(Error::InvalidKeySize(data.len()));
        }

        let (key, expected) = data.split_at(ARMADILLO_KEY_SIZE);
        let digest = md5::compute(key);
        let actual = &digest.0[..ARMADILLO_DIGEST_SIZE];
        if actual != expected {
            return Err(Error::KeyDigestMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            });
        }

        let mut out = [0u8; ARMADILLO_KEY_SIZE];
        out.copy_from_slice(key);
        Ok(Self { key: out })
    }

    /// The raw 16-byte Salsa20 key.
    pub fn key_bytes(&self) -> &[u8; ARMADILLO_KEY_SIZE] {
        &self.key
    }

    /// Decrypt an object delivered encrypted by the CDN.
    ///
    /// The cipher is Salsa20 keyed with the bare 16-byte key (the 128-bit
    /// variant); the nonce is the last 8 bytes of the raw object key.
    pub fn decrypt_object(&self, object_key: &str, data: &[u8]) -> Result<Vec<u8>> {
        let raw_key =
            hex::decode(object_key).map_err(|_| Error::InvalidObjectKey(object_key.to_string()))?;
        if raw_key.len() < salsa::NONCE_SIZE {
            return Err(Error::InvalidObjectKey(object_key.to_string()));
        }

        let mut nonce = [0u8; salsa::NONCE_SIZE];
        nonce.copy_from_slice(&raw_key[raw_key.len() - salsa::NONCE_SIZE..]);

        trace!("decrypting {} bytes for {object_key}", data.len());
        let mut out = data.to_vec();
        salsa::apply_keystream(&self.key, &nonce, &mut out);
        Ok(out)
    }
}

impl std::fmt::Debug for ArmadilloKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("ArmadilloKey").finish_non_exhaustive()
    }
}
