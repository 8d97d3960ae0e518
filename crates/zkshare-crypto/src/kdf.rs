//! Key derivation: Argon2id passphrase → share key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zkshare_core::{ShareError, ShareResult};

use crate::keys::ShareKey;
use crate::KEY_SIZE;

/// Argon2id parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive a share key from a passphrase and salt using Argon2id.
///
/// The salt should be 16 random bytes stored alongside the share (it does not
/// need to be secret).
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8; 16],
    params: &KdfParams,
) -> ShareResult<ShareKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| ShareError::InvalidInput(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    Ok(ShareKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_kdf_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = [1u8; 16];

        let key1 = derive_key(&passphrase, &salt, &fast()).unwrap();
        let key2 = derive_key(&passphrase, &salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let key1 = derive_key(&passphrase, &[1u8; 16], &fast()).unwrap();
        let key2 = derive_key(&passphrase, &[2u8; 16], &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_differs_from_plain_hash() {
        let key = derive_key(&SecretString::from("hunter2"), &[9u8; 16], &fast()).unwrap();
        let weak = crate::keys::key_from_passphrase("hunter2");
        assert_ne!(key.as_bytes(), weak.as_bytes());
    }

    #[test]
    fn test_kdf_rejects_bad_params() {
        let params = KdfParams {
            mem_cost_kib: 1,
            time_cost: 0,
            parallelism: 1,
        };
        let result = derive_key(&SecretString::from("x"), &[0u8; 16], &params);
        assert!(matches!(result, Err(ShareError::InvalidInput(_))));
    }
}
