//! RocksDB record backend.
//!
//! Key layout:
//! ```text
//! share/{id}      -> Share (JSON)
//! handshake/{id}  -> Handshake (JSON)
//! code/{CODE}     -> handshake id
//! ```
//!
//! Reads go straight to RocksDB. Read-modify-write operations hold a single
//! writer mutex and commit through one `WriteBatch`, so a handshake row and
//! its code index never disagree.

use anyhow::Context;
use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use zkshare_core::{Handshake, Share, ShareError, ShareResult};

use crate::records::{self, RecordStore};

const SHARE_PREFIX: &str = "share/";
const HANDSHAKE_PREFIX: &str = "handshake/";
const CODE_PREFIX: &str = "code/";

pub struct RocksRecordStore {
    db: DB,
    writer: Mutex<()>,
}

impl RocksRecordStore {
    /// Open or create a RocksDB record store at the given directory.
    pub fn open(path: &Path) -> ShareResult<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)
            .with_context(|| format!("opening RocksDB: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "rocksdb record store opened");
        Ok(Self {
            db,
            writer: Mutex::new(()),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> ShareResult<Option<T>> {
        match self.db.get(key.as_bytes()).map_err(db_err)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("decoding record {key}"))?,
            )),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> ShareResult<Vec<T>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push(
                serde_json::from_slice(&value)
                    .with_context(|| format!("decoding record {}", String::from_utf8_lossy(&key)))?,
            );
        }
        Ok(out)
    }

    fn load_share(&self, id: &str) -> ShareResult<Share> {
        self.get_json(&share_key(id))?
            .ok_or_else(|| records::share_not_found(id))
    }

    fn load_handshake(&self, id: &str) -> ShareResult<Handshake> {
        self.get_json(&handshake_key(id))?
            .ok_or_else(|| records::handshake_not_found(id))
    }

    fn write(&self, batch: WriteBatch) -> ShareResult<()> {
        self.db.write(batch).map_err(db_err)
    }

    fn update_share(
        &self,
        id: &str,
        f: impl FnOnce(&mut Share) -> ShareResult<()>,
    ) -> ShareResult<Share> {
        let _writer = self.writer.lock();
        let mut share = self.load_share(id)?;
        f(&mut share)?;
        let mut batch = WriteBatch::default();
        batch.put(share_key(id), to_json(&share)?);
        self.write(batch)?;
        Ok(share)
    }

    fn update_handshake(
        &self,
        id: &str,
        f: impl FnOnce(&mut Handshake) -> ShareResult<()>,
    ) -> ShareResult<Handshake> {
        let _writer = self.writer.lock();
        let mut hs = self.load_handshake(id)?;
        f(&mut hs)?;
        let mut batch = WriteBatch::default();
        batch.put(handshake_key(id), to_json(&hs)?);
        self.write(batch)?;
        Ok(hs)
    }
}

fn share_key(id: &str) -> String {
    format!("{SHARE_PREFIX}{id}")
}

fn handshake_key(id: &str) -> String {
    format!("{HANDSHAKE_PREFIX}{id}")
}

fn code_key(code: &str) -> String {
    format!("{CODE_PREFIX}{}", records::code_key(code))
}

fn to_json<T: Serialize>(value: &T) -> ShareResult<Vec<u8>> {
    Ok(serde_json::to_vec(value).context("encoding record")?)
}

fn db_err(e: rocksdb::Error) -> ShareError {
    ShareError::Storage(format!("rocksdb: {e}"))
}

impl RecordStore for RocksRecordStore {
    fn insert_share(&self, share: Share) -> ShareResult<()> {
        records::validate_id("share", &share.id)?;
        let _writer = self.writer.lock();
        let key = share_key(&share.id);
        if self.db.get(key.as_bytes()).map_err(db_err)?.is_some() {
            return Err(ShareError::Conflict(format!("share {} exists", share.id)));
        }
        let mut batch = WriteBatch::default();
        batch.put(key, to_json(&share)?);
        self.write(batch)
    }

    fn get_share(&self, id: &str) -> ShareResult<Share> {
        self.load_share(id)
    }

    fn list_shares(&self) -> ShareResult<Vec<Share>> {
        let mut shares: Vec<Share> = self.scan(SHARE_PREFIX)?;
        records::sort_shares(&mut shares);
        Ok(shares)
    }

    fn increment_downloads(&self, id: &str) -> ShareResult<u64> {
        self.update_share(id, |s| {
            s.download_count += 1;
            Ok(())
        })
        .map(|s| s.download_count)
    }

    fn consume_download(&self, id: &str, now: u64) -> ShareResult<Share> {
        self.update_share(id, |s| records::consume(s, now))
    }

    fn remove_share(&self, id: &str) -> ShareResult<Share> {
        let _writer = self.writer.lock();
        let share = self.load_share(id)?;
        let mut batch = WriteBatch::default();
        batch.delete(share_key(id));
        self.write(batch)?;
        Ok(share)
    }

    fn insert_handshake(&self, mut handshake: Handshake, now: u64) -> ShareResult<()> {
        records::validate_id("handshake", &handshake.id)?;
        handshake.code = records::code_key(&handshake.code);

        let _writer = self.writer.lock();
        if self.get_json::<Handshake>(&handshake_key(&handshake.id))?.is_some() {
            return Err(ShareError::Conflict(format!(
                "handshake {} exists",
                handshake.id
            )));
        }

        let mut batch = WriteBatch::default();
        let index = code_key(&handshake.code);
        if let Some(holder_id) = self.db.get(index.as_bytes()).map_err(db_err)? {
            let holder_id = String::from_utf8_lossy(&holder_id).into_owned();
            if let Some(holder) = self.get_json::<Handshake>(&handshake_key(&holder_id))? {
                if !holder.is_expired(now) {
                    return Err(ShareError::Conflict(format!(
                        "pairing code {} in use",
                        handshake.code
                    )));
                }
                batch.delete(handshake_key(&holder_id));
            }
        }

        batch.put(index, handshake.id.as_bytes());
        batch.put(handshake_key(&handshake.id), to_json(&handshake)?);
        self.write(batch)
    }

    fn get_handshake(&self, id: &str) -> ShareResult<Handshake> {
        self.load_handshake(id)
    }

    fn get_handshake_by_code(&self, code: &str) -> ShareResult<Handshake> {
        let not_found = || ShareError::NotFound(format!("pairing code {}", records::code_key(code)));
        let id = self
            .db
            .get(code_key(code).as_bytes())
            .map_err(db_err)?
            .ok_or_else(not_found)?;
        let id = String::from_utf8_lossy(&id).into_owned();
        self.get_json(&handshake_key(&id))?.ok_or_else(not_found)
    }

    fn set_sender_public_key(&self, id: &str, public_key: &str) -> ShareResult<Handshake> {
        self.update_handshake(id, |hs| records::pair(hs, public_key))
    }

    fn link_share(&self, id: &str, share_id: &str, filename: &str) -> ShareResult<Handshake> {
        self.update_handshake(id, |hs| records::link(hs, share_id, filename))
    }

    fn remove_handshake(&self, id: &str) -> ShareResult<Handshake> {
        let _writer = self.writer.lock();
        let hs = self.load_handshake(id)?;
        let mut batch = WriteBatch::default();
        batch.delete(handshake_key(id));
        let index = code_key(&hs.code);
        if let Some(holder) = self.db.get(index.as_bytes()).map_err(db_err)? {
            if holder == id.as_bytes() {
                batch.delete(index);
            }
        }
        self.write(batch)?;
        Ok(hs)
    }

    fn list_handshakes(&self) -> ShareResult<Vec<Handshake>> {
        let mut handshakes: Vec<Handshake> = self.scan(HANDSHAKE_PREFIX)?;
        records::sort_handshakes(&mut handshakes);
        Ok(handshakes)
    }

    fn flush(&self) -> ShareResult<()> {
        self.db.flush().map_err(db_err)
    }
}
