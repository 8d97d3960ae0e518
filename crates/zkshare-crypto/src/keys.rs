//! 256-bit share keys: generation, transport encoding, passphrase hashing

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;
use zkshare_core::{ShareError, ShareResult};

use crate::KEY_SIZE;

/// An AES-256 key for one share. Zeroized on drop.
#[derive(Clone)]
pub struct ShareKey {
    bytes: [u8; KEY_SIZE],
}

impl ShareKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Rejects anything that is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> ShareResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            ShareError::InvalidInput(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Unpadded URL-safe base64, suitable for a link fragment.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.bytes)
    }

    pub fn from_base64url(encoded: &str) -> ShareResult<Self> {
        let mut decoded = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| ShareError::InvalidInput(format!("key is not base64url: {e}")))?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }
}

impl Drop for ShareKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ShareKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit share key.
pub fn generate_key() -> ShareKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    ShareKey::from_bytes(bytes)
}

/// Key from a passphrase via a single SHA-256.
///
/// Fast and unsalted, so it offers no resistance to guessing. Kept for
/// compatibility with links whose passphrase is hashed in the browser; use
/// [`crate::kdf::derive_key`] for anything a human chose.
pub fn key_from_passphrase(passphrase: &str) -> ShareKey {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&digest);
    ShareKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_random() {
        let k1 = generate_key();
        let k2 = generate_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(ShareKey::from_slice(&[0u8; 16]).is_err());
        assert!(ShareKey::from_slice(&[0u8; 33]).is_err());
        assert!(ShareKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_base64url_roundtrip() {
        let key = generate_key();
        let encoded = key.to_base64url();
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
        let decoded = ShareKey::from_base64url(&encoded).unwrap();
        assert_eq!(key.as_bytes(), decoded.as_bytes());
    }

    #[test]
    fn test_base64url_rejects_short_key() {
        let short = URL_SAFE_NO_PAD.encode([1u8; 31]);
        assert!(matches!(
            ShareKey::from_base64url(&short),
            Err(ShareError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_passphrase_key_is_sha256() {
        let key = key_from_passphrase("correct horse");
        let expected = Sha256::digest(b"correct horse");
        assert_eq!(key.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_debug_redacts() {
        let key = ShareKey::from_bytes([0xAB; 32]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("171"));
    }
}
