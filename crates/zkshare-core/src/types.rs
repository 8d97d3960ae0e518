use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Whether a share can still be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    Active,
    /// `expires_at` has been reached
    Expired,
    /// `download_count` reached `max_downloads`
    Exhausted,
}

/// Metadata for an encrypted file placed behind a link.
///
/// The store never sees plaintext or keys; `key_material` is an opaque,
/// caller-wrapped blob for deployments that choose to park one here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    /// Original filename as supplied by the sender
    pub filename: String,
    /// Object key of the encrypted blob in object storage
    pub storage_locator: String,
    #[serde(default)]
    pub key_material: Option<String>,
    /// Ciphertext size in bytes
    pub size: u64,
    /// Unix timestamp (seconds)
    pub created_at: u64,
    /// Unix timestamp (seconds); `None` never expires
    #[serde(default)]
    pub expires_at: Option<u64>,
    /// `None` or `Some(0)` means unlimited
    #[serde(default)]
    pub max_downloads: Option<u64>,
    #[serde(default)]
    pub download_count: u64,
    /// Argon2id PHC string
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub owner_token: Option<String>,
}

impl Share {
    /// The one predicate every caller uses to decide whether a share is live.
    /// Expiry takes precedence over exhaustion.
    pub fn status(&self, now: u64) -> ShareStatus {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return ShareStatus::Expired;
            }
        }
        match self.max_downloads {
            Some(max) if max > 0 && self.download_count >= max => ShareStatus::Exhausted,
            _ => ShareStatus::Active,
        }
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.status(now) == ShareStatus::Active
    }

    /// Strictly past expiry; the sweep only removes these.
    pub fn is_past_expiry(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| now > t)
    }

    pub fn remaining_downloads(&self) -> Option<u64> {
        match self.max_downloads {
            Some(max) if max > 0 => Some(max.saturating_sub(self.download_count)),
            _ => None,
        }
    }
}

/// Position of a handshake in its one-way lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStatus {
    /// Receiver published its public key, no sender yet
    Waiting,
    /// Sender public key set
    Paired,
    /// Share linked
    Completed,
    Expired,
}

/// A key-exchange session coordinated through the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub id: String,
    /// Uppercase pairing word
    pub code: String,
    /// Base64 SEC1 point
    pub receiver_public_key: String,
    #[serde(default)]
    pub sender_public_key: Option<String>,
    #[serde(default)]
    pub share_id: Option<String>,
    /// Filename of the linked share, written together with `share_id`
    #[serde(default)]
    pub filename: Option<String>,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Handshake {
    pub fn status(&self, now: u64) -> HandshakeStatus {
        if self.is_expired(now) {
            HandshakeStatus::Expired
        } else if self.share_id.is_some() {
            HandshakeStatus::Completed
        } else if self.sender_public_key.is_some() {
            HandshakeStatus::Paired
        } else {
            HandshakeStatus::Waiting
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}
