//! Ephemeral P-256 ECDH for the pairing handshake
//!
//! Public keys travel as standard base64 of the uncompressed SEC1 point
//! (65 bytes), the same bytes WebCrypto exports as `raw`. The 32-byte
//! x-coordinate of the shared point is used directly as the AES-256 key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand::rngs::OsRng;
use zkshare_core::{ShareError, ShareResult};

use crate::keys::ShareKey;
use crate::KEY_SIZE;

/// One side's ephemeral key pair. The secret half never leaves memory.
pub struct KeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key_base64(&self) -> String {
        encode_public_key(&self.public)
    }

    /// Compute the shared secret with the peer's encoded public key.
    pub fn agree(&self, peer_public_key: &str) -> ShareResult<ShareKey> {
        let peer = decode_public_key(peer_public_key)?;
        let shared = self.secret.diffie_hellman(&peer);
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(shared.raw_secret_bytes());
        Ok(ShareKey::from_bytes(bytes))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_base64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub fn encode_public_key(key: &PublicKey) -> String {
    STANDARD.encode(key.to_encoded_point(false).as_bytes())
}

/// Parse a base64 SEC1 point, rejecting anything not on the curve.
pub fn decode_public_key(encoded: &str) -> ShareResult<PublicKey> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ShareError::InvalidInput(format!("public key is not base64: {e}")))?;
    PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| ShareError::InvalidInput("public key is not a valid P-256 point".into()))
}
