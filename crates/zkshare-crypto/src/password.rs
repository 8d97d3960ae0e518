//! Share password hashing (Argon2id PHC strings)

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use zkshare_core::{ShareError, ShareResult};

/// Hash a share password into a self-describing PHC string.
pub fn hash_password(password: &str) -> ShareResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}").into())
}

/// Check a password against a stored PHC string.
pub fn verify_password(password: &str, phc: &str) -> ShareResult<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| ShareError::InvalidInput(format!("malformed password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
