//! Single-shot AES-256-GCM sealing
//!
//! Blob format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No associated data. Byte-compatible with a single WebCrypto
//! `AES-GCM` encrypt call, which is why the whole payload is held in memory.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zkshare_core::{ShareError, ShareResult};

use crate::keys::ShareKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Seal `plaintext` under `key` with a fresh random nonce.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn seal(key: &ShareKey, plaintext: &[u8]) -> ShareResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Open a blob produced by [`seal`].
///
/// Any failure, including a blob too short to hold a nonce and tag, is
/// reported as [`ShareError::AuthenticationFailure`].
pub fn open(key: &ShareKey, blob: &[u8]) -> ShareResult<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ShareError::AuthenticationFailure);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ShareError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = generate_key();
        let plaintext = b"hello, sealed world!";

        let blob = seal(&key, plaintext).unwrap();
        assert_eq!(open(&key, &blob).unwrap(), plaintext);
    }

    #[test]
    fn test_seal_open_empty() {
        let key = generate_key();
        let blob = seal(&key, b"").unwrap();
        assert_eq!(blob.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(open(&key, &blob).unwrap(), b"");
    }

    #[test]
    fn test_sealed_size() {
        let key = generate_key();
        let blob = seal(&key, &[0u8; 1000]).unwrap();
        // nonce (12) + plaintext (1000) + tag (16)
        assert_eq!(blob.len(), 12 + 1000 + 16);
    }

    #[test]
    fn test_wrong_key() {
        let blob = seal(&generate_key(), b"secret data").unwrap();
        assert!(matches!(
            open(&generate_key(), &blob),
            Err(ShareError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let key = generate_key();
        let blob = seal(&key, b"tamper me").unwrap();
        for byte in 0..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(open(&key, &tampered), Err(ShareError::AuthenticationFailure)),
                    "flip at byte {byte} bit {bit} must fail"
                );
            }
        }
    }

    #[test]
    fn test_short_blob() {
        let key = generate_key();
        assert!(matches!(
            open(&key, &[0u8; 27]),
            Err(ShareError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = generate_key();
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }
}
