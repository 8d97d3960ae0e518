//! Record store contract and the row-level rules every backend applies.
//!
//! Backends differ only in how rows are persisted; the transitions below
//! (`consume`, `pair`, `link`) are shared so both enforce identical semantics.

use std::sync::Arc;
use zkshare_core::config::{StoreBackend, StoreConfig};
use zkshare_core::{Handshake, Share, ShareError, ShareResult, ShareStatus};

/// Durable CRUD for share and handshake rows.
///
/// Every method is a single atomic operation: a concurrent reader sees either
/// the whole mutation or none of it. Nothing here retries.
pub trait RecordStore: Send + Sync {
    /// Fails with `Conflict` if the id exists.
    fn insert_share(&self, share: Share) -> ShareResult<()>;
    /// Returns the row even if expired or exhausted.
    fn get_share(&self, id: &str) -> ShareResult<Share>;
    /// All rows, newest first.
    fn list_shares(&self) -> ShareResult<Vec<Share>>;
    /// Unconditional increment. Returns the new count.
    fn increment_downloads(&self, id: &str) -> ShareResult<u64>;
    /// Check-and-increment in one step: fails with `Expired` / `Exhausted`
    /// without touching the counter. Returns the updated row.
    fn consume_download(&self, id: &str, now: u64) -> ShareResult<Share>;
    /// Delete and return the row. Exactly one concurrent caller wins.
    fn remove_share(&self, id: &str) -> ShareResult<Share>;

    /// Fails with `Conflict` if the id exists or a non-expired handshake
    /// holds the same code. An expired holder of the code is replaced.
    fn insert_handshake(&self, handshake: Handshake, now: u64) -> ShareResult<()>;
    fn get_handshake(&self, id: &str) -> ShareResult<Handshake>;
    /// `code` is matched case-insensitively.
    fn get_handshake_by_code(&self, code: &str) -> ShareResult<Handshake>;
    /// waiting → paired. `Conflict` if a sender key is already present.
    fn set_sender_public_key(&self, id: &str, public_key: &str) -> ShareResult<Handshake>;
    /// paired → completed. Writes `share_id` and `filename` together.
    fn link_share(&self, id: &str, share_id: &str, filename: &str) -> ShareResult<Handshake>;
    fn remove_handshake(&self, id: &str) -> ShareResult<Handshake>;
    /// All rows, newest first.
    fn list_handshakes(&self) -> ShareResult<Vec<Handshake>>;

    /// Flush pending changes to durable storage.
    fn flush(&self) -> ShareResult<()>;
}

/// Open the configured backend.
pub fn open_record_store(cfg: &StoreConfig) -> ShareResult<Arc<dyn RecordStore>> {
    match cfg.backend {
        StoreBackend::Json => Ok(Arc::new(crate::json::JsonRecordStore::open(&cfg.path)?)),
        #[cfg(feature = "rocksdb")]
        StoreBackend::Rocksdb => Ok(Arc::new(crate::rocks::RocksRecordStore::open(&cfg.path)?)),
        #[cfg(not(feature = "rocksdb"))]
        StoreBackend::Rocksdb => Err(ShareError::Config(
            "store.backend = \"rocksdb\" requires the rocksdb feature".into(),
        )),
    }
}

pub(crate) fn validate_id(kind: &str, id: &str) -> ShareResult<()> {
    if id.is_empty() || id.len() > 128 || id.contains('/') || id.chars().any(char::is_control) {
        return Err(ShareError::InvalidInput(format!("invalid {kind} id: {id:?}")));
    }
    Ok(())
}

pub(crate) fn share_not_found(id: &str) -> ShareError {
    ShareError::NotFound(format!("share {id}"))
}

pub(crate) fn handshake_not_found(id: &str) -> ShareError {
    ShareError::NotFound(format!("handshake {id}"))
}

/// Gate a download against the shared status predicate, then count it.
pub(crate) fn consume(share: &mut Share, now: u64) -> ShareResult<()> {
    match share.status(now) {
        ShareStatus::Active => {
            share.download_count += 1;
            Ok(())
        }
        ShareStatus::Expired => Err(ShareError::Expired(format!("share {}", share.id))),
        ShareStatus::Exhausted => Err(ShareError::Exhausted(format!("share {}", share.id))),
    }
}

pub(crate) fn pair(handshake: &mut Handshake, public_key: &str) -> ShareResult<()> {
    if handshake.sender_public_key.is_some() {
        return Err(ShareError::Conflict(format!(
            "handshake {} already has a sender",
            handshake.id
        )));
    }
    handshake.sender_public_key = Some(public_key.to_string());
    Ok(())
}

pub(crate) fn link(handshake: &mut Handshake, share_id: &str, filename: &str) -> ShareResult<()> {
    if handshake.sender_public_key.is_none() {
        return Err(ShareError::Conflict(format!(
            "handshake {} is not paired",
            handshake.id
        )));
    }
    if handshake.share_id.is_some() {
        return Err(ShareError::Conflict(format!(
            "handshake {} already linked",
            handshake.id
        )));
    }
    handshake.share_id = Some(share_id.to_string());
    handshake.filename = Some(filename.to_string());
    Ok(())
}

/// Canonical stored form of a pairing code.
pub(crate) fn code_key(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Newest first; id breaks ties so listings are stable.
pub(crate) fn sort_shares(shares: &mut [Share]) {
    shares.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

pub(crate) fn sort_handshakes(handshakes: &mut [Handshake]) {
    handshakes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}
