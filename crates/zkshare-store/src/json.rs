//! JSON-file record backend.
//!
//! The whole record set lives in memory and is rewritten to disk on every
//! mutation (temp file + rename, so a crash leaves the old or the new file,
//! never a torn one). A writer mutex serializes mutations; readers only
//! contend with the brief pointer swap at the end of each write, never with
//! disk I/O.

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use zkshare_core::{Handshake, Share, ShareError, ShareResult};

use crate::records::{self, RecordStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    shares: HashMap<String, Share>,
    #[serde(default)]
    handshakes: HashMap<String, Handshake>,
}

pub struct JsonRecordStore {
    path: PathBuf,
    records: RwLock<Records>,
    writer: Mutex<()>,
}

impl JsonRecordStore {
    /// Load or create a record file at the given path.
    /// If the file doesn't exist, starts empty (the file appears on first write).
    pub fn open(path: &Path) -> ShareResult<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading record store: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing record store: {}", path.display()))?
        } else {
            Records::default()
        };

        tracing::debug!(
            path = %path.display(),
            shares = records.shares.len(),
            handshakes = records.handshakes.len(),
            "json record store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Records) -> ShareResult<T>) -> ShareResult<T> {
        let _writer = self.writer.lock();
        let mut next = self.records.read().clone();
        let out = f(&mut next)?;
        persist(&self.path, &next)?;
        *self.records.write() = next;
        Ok(out)
    }
}

/// Atomic write: write to temp file, then rename
fn persist(path: &Path, records: &Records) -> ShareResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating record dir: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(records).context("serializing record store")?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, &json)
        .with_context(|| format!("writing record store temp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming record store: {}", path.display()))?;
    Ok(())
}

impl RecordStore for JsonRecordStore {
    fn insert_share(&self, share: Share) -> ShareResult<()> {
        records::validate_id("share", &share.id)?;
        self.mutate(|r| {
            if r.shares.contains_key(&share.id) {
                return Err(ShareError::Conflict(format!("share {} exists", share.id)));
            }
            r.shares.insert(share.id.clone(), share);
            Ok(())
        })
    }

    fn get_share(&self, id: &str) -> ShareResult<Share> {
        self.records
            .read()
            .shares
            .get(id)
            .cloned()
            .ok_or_else(|| records::share_not_found(id))
    }

    fn list_shares(&self) -> ShareResult<Vec<Share>> {
        let mut shares: Vec<Share> = self.records.read().shares.values().cloned().collect();
        records::sort_shares(&mut shares);
        Ok(shares)
    }

    fn increment_downloads(&self, id: &str) -> ShareResult<u64> {
        self.mutate(|r| {
            let share = r
                .shares
                .get_mut(id)
                .ok_or_else(|| records::share_not_found(id))?;
            share.download_count += 1;
            Ok(share.download_count)
        })
    }

    fn consume_download(&self, id: &str, now: u64) -> ShareResult<Share> {
        self.mutate(|r| {
            let share = r
                .shares
                .get_mut(id)
                .ok_or_else(|| records::share_not_found(id))?;
            records::consume(share, now)?;
            Ok(share.clone())
        })
    }

    fn remove_share(&self, id: &str) -> ShareResult<Share> {
        self.mutate(|r| r.shares.remove(id).ok_or_else(|| records::share_not_found(id)))
    }

    fn insert_handshake(&self, mut handshake: Handshake, now: u64) -> ShareResult<()> {
        records::validate_id("handshake", &handshake.id)?;
        handshake.code = records::code_key(&handshake.code);
        self.mutate(|r| {
            if r.handshakes.contains_key(&handshake.id) {
                return Err(ShareError::Conflict(format!(
                    "handshake {} exists",
                    handshake.id
                )));
            }
            let holders: Vec<Handshake> = r
                .handshakes
                .values()
                .filter(|h| h.code == handshake.code)
                .cloned()
                .collect();
            if holders.iter().any(|h| !h.is_expired(now)) {
                return Err(ShareError::Conflict(format!(
                    "pairing code {} in use",
                    handshake.code
                )));
            }
            for stale in holders {
                r.handshakes.remove(&stale.id);
            }
            r.handshakes.insert(handshake.id.clone(), handshake);
            Ok(())
        })
    }

    fn get_handshake(&self, id: &str) -> ShareResult<Handshake> {
        self.records
            .read()
            .handshakes
            .get(id)
            .cloned()
            .ok_or_else(|| records::handshake_not_found(id))
    }

    fn get_handshake_by_code(&self, code: &str) -> ShareResult<Handshake> {
        let code = records::code_key(code);
        self.records
            .read()
            .handshakes
            .values()
            .find(|h| h.code == code)
            .cloned()
            .ok_or_else(|| ShareError::NotFound(format!("pairing code {code}")))
    }

    fn set_sender_public_key(&self, id: &str, public_key: &str) -> ShareResult<Handshake> {
        self.mutate(|r| {
            let hs = r
                .handshakes
                .get_mut(id)
                .ok_or_else(|| records::handshake_not_found(id))?;
            records::pair(hs, public_key)?;
            Ok(hs.clone())
        })
    }

    fn link_share(&self, id: &str, share_id: &str, filename: &str) -> ShareResult<Handshake> {
        self.mutate(|r| {
            let hs = r
                .handshakes
                .get_mut(id)
                .ok_or_else(|| records::handshake_not_found(id))?;
            records::link(hs, share_id, filename)?;
            Ok(hs.clone())
        })
    }

    fn remove_handshake(&self, id: &str) -> ShareResult<Handshake> {
        self.mutate(|r| {
            r.handshakes
                .remove(id)
                .ok_or_else(|| records::handshake_not_found(id))
        })
    }

    fn list_handshakes(&self) -> ShareResult<Vec<Handshake>> {
        let mut handshakes: Vec<Handshake> =
            self.records.read().handshakes.values().cloned().collect();
        records::sort_handshakes(&mut handshakes);
        Ok(handshakes)
    }

    fn flush(&self) -> ShareResult<()> {
        // every mutation is already on disk
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::conformance;
    use std::sync::Arc;

    #[test]
    fn open_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::open(&dir.path().join("records.json")).unwrap();
        assert!(store.list_shares().unwrap().is_empty());
        assert!(!store.path().exists(), "file appears on first write");
    }

    #[test]
    fn conformance_suite() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::open(&dir.path().join("records.json")).unwrap();
        conformance::run_all(&store);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/records.json");
        {
            let store = JsonRecordStore::open(&path).unwrap();
            store.insert_share(conformance::share("keep", 10)).unwrap();
            store.increment_downloads("keep").unwrap();
            store
                .insert_handshake(conformance::handshake("h", "lynx", 10, 500), 10)
                .unwrap();
        }
        let store = JsonRecordStore::open(&path).unwrap();
        assert_eq!(store.get_share("keep").unwrap().download_count, 1);
        assert_eq!(store.get_handshake_by_code("LYNX").unwrap().id, "h");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(JsonRecordStore::open(&path).is_err());
    }

    #[test]
    fn failed_mutation_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::open(&dir.path().join("records.json")).unwrap();
        let mut s = conformance::share("one", 10);
        s.max_downloads = Some(1);
        store.insert_share(s).unwrap();
        store.consume_download("one", 20).unwrap();
        assert!(store.consume_download("one", 20).is_err());
        assert_eq!(store.get_share("one").unwrap().download_count, 1);
    }

    #[test]
    fn concurrent_consumers_never_exceed_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonRecordStore::open(&dir.path().join("records.json")).unwrap());
        let mut s = conformance::share("hot", 10);
        s.max_downloads = Some(5);
        store.insert_share(s).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.consume_download("hot", 20).is_ok())
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 5);
        assert_eq!(store.get_share("hot").unwrap().download_count, 5);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonRecordStore::open(&dir.path().join("records.json")).unwrap());
        store.insert_share(conformance::share("counter", 10)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store.increment_downloads("counter").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get_share("counter").unwrap().download_count, 40);
    }
}
