//! zkshare-crypto: client-side encryption for zkshare
//!
//! Two AES-256-GCM wire formats share one contract (`seal` / `open`, 256-bit
//! key, one generic authentication failure):
//! ```text
//! single-shot: [12B nonce][ciphertext][16B tag]
//! chunked:     [12B file nonce] then per 64 KiB chunk [4B BE len][12B nonce][ciphertext+tag]
//! ```
//!
//! Keys come from [`generate_key`], a passphrase ([`key_from_passphrase`] or
//! the slow [`kdf::derive_key`]), or a P-256 exchange ([`KeyPair::agree`]).

pub mod exchange;
pub mod kdf;
pub mod keys;
pub mod password;
pub mod sealed;
pub mod stream;
pub mod words;

pub use exchange::KeyPair;
pub use keys::{generate_key, key_from_passphrase, ShareKey};
pub use password::{hash_password, verify_password};
pub use stream::{decrypt_stream, encrypt_stream, open_chunked, seal_chunked, CHUNK_SIZE};
pub use words::{normalize_code, random_word, verification_phrase};

use zkshare_core::ShareResult;

/// Size of a share key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// A sealing format. Both formats are self-contained: the blob carries its
/// own nonce(s), the key travels separately.
pub trait Codec {
    fn seal(&self, key: &ShareKey, plaintext: &[u8]) -> ShareResult<Vec<u8>>;
    fn open(&self, key: &ShareKey, blob: &[u8]) -> ShareResult<Vec<u8>>;
}

/// Whole payload in one AEAD call
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleShot;

/// Bounded-memory 64 KiB framing
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunked;

impl Codec for SingleShot {
    fn seal(&self, key: &ShareKey, plaintext: &[u8]) -> ShareResult<Vec<u8>> {
        sealed::seal(key, plaintext)
    }

    fn open(&self, key: &ShareKey, blob: &[u8]) -> ShareResult<Vec<u8>> {
        sealed::open(key, blob)
    }
}

impl Codec for Chunked {
    fn seal(&self, key: &ShareKey, plaintext: &[u8]) -> ShareResult<Vec<u8>> {
        stream::seal_chunked(key, plaintext)
    }

    fn open(&self, key: &ShareKey, blob: &[u8]) -> ShareResult<Vec<u8>> {
        stream::open_chunked(key, blob)
    }
}
