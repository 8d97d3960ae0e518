//! Shares and handshakes as whole units: record plus encrypted object.
//!
//! Removal always claims the record first (exactly one caller wins) and only
//! then deletes the object, so concurrent revoke and sweep never double-delete.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use opendal::Writer;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};
use zkshare_core::{now_secs, Handshake, Share, ShareError, ShareResult};
use zkshare_storage::{locator_for, ObjectReader, ObjectStore};

use crate::records::{self, RecordStore};

/// Read size used when copying a sealed stream into storage
const UPLOAD_PIECE: usize = 256 * 1024;

/// Sender-supplied parameters for a new share
#[derive(Debug, Clone, Default)]
pub struct NewShare {
    pub filename: String,
    /// `None` never expires
    pub expires_in: Option<Duration>,
    /// `None` or `Some(0)` is unlimited
    pub max_downloads: Option<u64>,
    /// Already-hashed password (see `zkshare_crypto::hash_password`)
    pub password_hash: Option<String>,
    pub key_material: Option<String>,
}

/// Receiver-supplied parameters for a new handshake
#[derive(Debug, Clone)]
pub struct NewHandshake {
    pub code: String,
    pub receiver_public_key: String,
    pub ttl: Duration,
}

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub shares: usize,
    pub handshakes: usize,
}

#[derive(Clone)]
pub struct LifecycleStore {
    records: Arc<dyn RecordStore>,
    objects: ObjectStore,
}

impl LifecycleStore {
    pub fn new(records: Arc<dyn RecordStore>, objects: ObjectStore) -> Self {
        Self { records, objects }
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    // ── Shares ───────────────────────────────────────────────────────────

    /// Upload the encrypted blob and register its record.
    ///
    /// If the record cannot be written the object is removed again.
    pub async fn create_share(
        &self,
        new: NewShare,
        ciphertext: impl Into<Bytes>,
    ) -> ShareResult<Share> {
        validate_new_share(&new)?;
        let id = new_id();
        let locator = locator_for(&id);
        let size = self.objects.put(&locator, ciphertext).await?;
        self.finish_share(id, locator, new, size).await
    }

    /// Start an incremental upload. Nothing is visible until
    /// [`ShareUpload::commit`].
    pub async fn begin_share(&self, new: NewShare) -> ShareResult<ShareUpload> {
        validate_new_share(&new)?;
        let id = new_id();
        let locator = locator_for(&id);
        let writer = self.objects.writer(&locator).await?;
        debug!(share_id = %id, "upload started");
        Ok(ShareUpload {
            store: self.clone(),
            new,
            id,
            locator,
            writer,
            size: 0,
        })
    }

    /// Upload an already-sealed stream piecewise and register it.
    pub async fn create_share_from_reader<R>(&self, new: NewShare, mut reader: R) -> ShareResult<Share>
    where
        R: AsyncRead + Unpin,
    {
        let mut upload = self.begin_share(new).await?;
        let mut buf = vec![0u8; UPLOAD_PIECE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    upload.abort().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = upload.write(Bytes::copy_from_slice(&buf[..n])).await {
                upload.abort().await;
                return Err(e);
            }
        }
        upload.commit().await
    }

    async fn finish_share(
        &self,
        id: String,
        locator: String,
        new: NewShare,
        size: u64,
    ) -> ShareResult<Share> {
        let now = now_secs();
        let share = Share {
            id: id.clone(),
            filename: new.filename,
            storage_locator: locator.clone(),
            key_material: new.key_material,
            size,
            created_at: now,
            expires_at: new.expires_in.map(|d| now.saturating_add(d.as_secs())),
            max_downloads: new.max_downloads,
            download_count: 0,
            password_hash: new.password_hash,
            owner_token: Some(generate_owner_token()),
        };

        if let Err(e) = self.records.insert_share(share.clone()) {
            if let Err(cleanup) = self.objects.delete(&locator).await {
                warn!(share_id = %id, "orphaned object after failed insert: {cleanup}");
            }
            return Err(e);
        }

        info!(
            share_id = %id,
            size,
            expires_at = ?share.expires_at,
            max_downloads = ?share.max_downloads,
            "share created"
        );
        Ok(share)
    }

    /// Register a record whose object is already in storage.
    pub async fn register_share(&self, share: Share) -> ShareResult<()> {
        if !self.objects.exists(&share.storage_locator).await? {
            return Err(ShareError::NotFound(format!(
                "object {}",
                share.storage_locator
            )));
        }
        self.records.insert_share(share)
    }

    pub fn get_share(&self, id: &str) -> ShareResult<Share> {
        self.records.get_share(id)
    }

    /// Every share, newest first, including expired and exhausted ones.
    pub fn list_shares(&self) -> ShareResult<Vec<Share>> {
        self.records.list_shares()
    }

    /// Shares that can still be downloaded, newest first.
    pub fn list_active_shares(&self) -> ShareResult<Vec<Share>> {
        let now = now_secs();
        Ok(self
            .records
            .list_shares()?
            .into_iter()
            .filter(|s| s.is_active(now))
            .collect())
    }

    pub fn increment_downloads(&self, id: &str) -> ShareResult<u64> {
        self.records.increment_downloads(id)
    }

    /// Atomically check the share is live and count one download.
    pub fn consume_download(&self, id: &str) -> ShareResult<Share> {
        self.records.consume_download(id, now_secs())
    }

    /// Whole encrypted object in memory. Prefer [`Self::open_object`] for
    /// anything large.
    pub async fn fetch_object(&self, share: &Share) -> ShareResult<Bytes> {
        self.objects.get(&share.storage_locator).await
    }

    pub async fn open_object(&self, share: &Share) -> ShareResult<ObjectReader> {
        self.objects.reader(&share.storage_locator).await
    }

    /// Delete a share and its object now.
    pub async fn revoke(&self, id: &str) -> ShareResult<Share> {
        let share = self.records.remove_share(id)?;
        self.delete_object_or_restore(&share).await?;
        info!(share_id = %id, "share revoked");
        Ok(share)
    }

    /// Revoke on behalf of the sender; requires the token issued at creation.
    pub async fn revoke_as_owner(&self, id: &str, owner_token: &str) -> ShareResult<Share> {
        let share = self.records.get_share(id)?;
        match share.owner_token.as_deref() {
            Some(expected) if tokens_match(expected, owner_token) => self.revoke(id).await,
            _ => Err(ShareError::Unauthorized(format!("owner token for share {id}"))),
        }
    }

    async fn delete_object_or_restore(&self, share: &Share) -> ShareResult<()> {
        if let Err(e) = self.objects.delete(&share.storage_locator).await {
            warn!(share_id = %share.id, "object delete failed, restoring record: {e}");
            if let Err(restore) = self.records.insert_share(share.clone()) {
                warn!(share_id = %share.id, "record restore failed: {restore}");
            }
            return Err(e);
        }
        Ok(())
    }

    // ── Handshakes ───────────────────────────────────────────────────────

    /// Insert a waiting handshake. `Conflict` if the code is held by a live
    /// handshake; choosing another code is the caller's job.
    pub fn create_handshake(&self, new: NewHandshake) -> ShareResult<Handshake> {
        let now = now_secs();
        let handshake = Handshake {
            id: new_id(),
            code: records::code_key(&new.code),
            receiver_public_key: new.receiver_public_key,
            sender_public_key: None,
            share_id: None,
            filename: None,
            created_at: now,
            expires_at: now.saturating_add(new.ttl.as_secs()),
        };
        if handshake.code.is_empty() {
            return Err(ShareError::InvalidInput("pairing code must not be empty".into()));
        }
        self.records.insert_handshake(handshake.clone(), now)?;
        debug!(handshake_id = %handshake.id, code = %handshake.code, "handshake created");
        Ok(handshake)
    }

    pub fn get_handshake(&self, id: &str) -> ShareResult<Handshake> {
        self.records.get_handshake(id)
    }

    pub fn get_handshake_by_code(&self, code: &str) -> ShareResult<Handshake> {
        self.records.get_handshake_by_code(code)
    }

    pub fn set_sender_public_key(&self, id: &str, public_key: &str) -> ShareResult<Handshake> {
        self.records.set_sender_public_key(id, public_key)
    }

    pub fn link_share(&self, id: &str, share_id: &str, filename: &str) -> ShareResult<Handshake> {
        self.records.link_share(id, share_id, filename)
    }

    /// Consume a handshake, freeing its pairing code.
    pub fn delete_handshake(&self, id: &str) -> ShareResult<Handshake> {
        self.records.remove_handshake(id)
    }

    pub fn list_handshakes(&self) -> ShareResult<Vec<Handshake>> {
        self.records.list_handshakes()
    }

    // ── Expiry sweep ─────────────────────────────────────────────────────

    pub async fn purge(&self) -> ShareResult<PurgeReport> {
        self.purge_at(now_secs()).await
    }

    /// Remove shares and handshakes strictly past expiry at `now`.
    ///
    /// A share whose object cannot be deleted keeps its record and is retried
    /// by the next sweep. Rows another caller removed first are skipped.
    pub async fn purge_at(&self, now: u64) -> ShareResult<PurgeReport> {
        let mut report = PurgeReport::default();

        for share in self.records.list_shares()? {
            if !share.is_past_expiry(now) {
                continue;
            }
            let claimed = match self.records.remove_share(&share.id) {
                Ok(s) => s,
                Err(ShareError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if self.delete_object_or_restore(&claimed).await.is_ok() {
                debug!(share_id = %claimed.id, "expired share purged");
                report.shares += 1;
            }
        }

        for handshake in self.records.list_handshakes()? {
            if now <= handshake.expires_at {
                continue;
            }
            match self.records.remove_handshake(&handshake.id) {
                Ok(_) => report.handshakes += 1,
                Err(ShareError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if report.shares > 0 || report.handshakes > 0 {
            info!(
                shares = report.shares,
                handshakes = report.handshakes,
                "expiry sweep"
            );
        }
        Ok(report)
    }
}

/// Encrypted object being written piece by piece
pub struct ShareUpload {
    store: LifecycleStore,
    new: NewShare,
    id: String,
    locator: String,
    writer: Writer,
    size: u64,
}

impl ShareUpload {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn write(&mut self, data: impl Into<Bytes>) -> ShareResult<()> {
        let data: Bytes = data.into();
        let len = data.len() as u64;
        self.writer
            .write(data)
            .await
            .map_err(|e| ShareError::Storage(format!("{}: {e}", self.locator)))?;
        self.size += len;
        Ok(())
    }

    /// Finish the object and register the share record.
    pub async fn commit(mut self) -> ShareResult<Share> {
        if let Err(e) = self.writer.close().await {
            let err = ShareError::Storage(format!("{}: {e}", self.locator));
            self.abort().await;
            return Err(err);
        }
        let ShareUpload {
            store,
            new,
            id,
            locator,
            size,
            ..
        } = self;
        store.finish_share(id, locator, new, size).await
    }

    /// Drop the partial object.
    pub async fn abort(mut self) {
        if let Err(e) = self.writer.abort().await {
            debug!(share_id = %self.id, "writer abort: {e}");
        }
        if let Err(e) = self.store.objects.delete(&self.locator).await {
            warn!(share_id = %self.id, "failed to remove partial upload: {e}");
        }
        debug!(share_id = %self.id, "upload aborted");
    }
}

fn validate_new_share(new: &NewShare) -> ShareResult<()> {
    if new.filename.trim().is_empty() {
        return Err(ShareError::InvalidInput("filename must not be empty".into()));
    }
    Ok(())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn generate_owner_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Length-independent comparison time for equal-length tokens
fn tokens_match(expected: &str, given: &str) -> bool {
    expected.len() == given.len()
        && expected
            .bytes()
            .zip(given.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonRecordStore;
    use zkshare_storage::memory_operator;

    fn store(dir: &tempfile::TempDir) -> LifecycleStore {
        let records = JsonRecordStore::open(&dir.path().join("records.json")).unwrap();
        LifecycleStore::new(
            Arc::new(records),
            ObjectStore::new(memory_operator().unwrap()),
        )
    }

    fn new_share(name: &str) -> NewShare {
        NewShare {
            filename: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_fetch_revoke() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let share = store
            .create_share(new_share("a.txt"), b"ciphertext".to_vec())
            .await
            .unwrap();
        assert_eq!(share.size, 10);
        assert!(share.owner_token.is_some());
        assert_eq!(store.fetch_object(&share).await.unwrap().as_ref(), b"ciphertext");

        store.revoke(&share.id).await.unwrap();
        assert!(store.get_share(&share.id).unwrap_err().is_not_found());
        assert!(!store.objects().exists(&share.storage_locator).await.unwrap());
        assert!(store.revoke(&share.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn owner_token_required_for_owner_revoke() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let share = store
            .create_share(new_share("b.txt"), b"x".to_vec())
            .await
            .unwrap();

        let err = store.revoke_as_owner(&share.id, "wrong").await.unwrap_err();
        assert!(matches!(err, ShareError::Unauthorized(_)));
        assert!(store.get_share(&share.id).is_ok());

        let token = share.owner_token.clone().unwrap();
        store.revoke_as_owner(&share.id, &token).await.unwrap();
        assert!(store.get_share(&share.id).is_err());
    }

    #[tokio::test]
    async fn empty_filename_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir)
            .create_share(new_share("  "), b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn register_requires_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let share = Share {
            id: "pre".into(),
            filename: "pre.bin".into(),
            storage_locator: locator_for("pre"),
            key_material: None,
            size: 3,
            created_at: now_secs(),
            expires_at: None,
            max_downloads: None,
            download_count: 0,
            password_hash: None,
            owner_token: None,
        };
        assert!(store.register_share(share.clone()).await.unwrap_err().is_not_found());
        store.objects().put(&share.storage_locator, b"abc".to_vec()).await.unwrap();
        store.register_share(share).await.unwrap();
        assert_eq!(store.get_share("pre").unwrap().size, 3);
    }

    #[tokio::test]
    async fn active_listing_filters_with_shared_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let live = store.create_share(new_share("live"), b"1".to_vec()).await.unwrap();
        let once = store
            .create_share(
                NewShare {
                    max_downloads: Some(1),
                    ..new_share("once")
                },
                b"2".to_vec(),
            )
            .await
            .unwrap();
        store.consume_download(&once.id).unwrap();

        let active: Vec<_> = store
            .list_active_shares()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(active, vec![live.id.clone()]);
        assert_eq!(store.list_shares().unwrap().len(), 2);
        assert!(store.consume_download(&once.id).unwrap_err().is_gone());
    }

    #[tokio::test]
    async fn purge_removes_only_strictly_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let short = store
            .create_share(
                NewShare {
                    expires_in: Some(Duration::from_secs(60)),
                    ..new_share("short")
                },
                b"s".to_vec(),
            )
            .await
            .unwrap();
        let forever = store.create_share(new_share("forever"), b"f".to_vec()).await.unwrap();
        let deadline = short.expires_at.unwrap();

        // at the boundary the share is inactive but not yet purgeable
        assert!(!short.is_active(deadline));
        assert_eq!(store.purge_at(deadline).await.unwrap(), PurgeReport::default());

        let report = store.purge_at(deadline + 1).await.unwrap();
        assert_eq!(report.shares, 1);
        assert!(store.get_share(&short.id).unwrap_err().is_not_found());
        assert!(!store.objects().exists(&short.storage_locator).await.unwrap());

        assert!(store.get_share(&forever.id).is_ok());
        assert!(store.objects().exists(&forever.storage_locator).await.unwrap());
    }

    #[tokio::test]
    async fn purge_sweeps_expired_handshakes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let hs = store
            .create_handshake(NewHandshake {
                code: "heron".into(),
                receiver_public_key: "pk".into(),
                ttl: Duration::from_secs(30),
            })
            .unwrap();
        assert_eq!(hs.code, "HERON");

        assert_eq!(store.purge_at(hs.expires_at).await.unwrap().handshakes, 0);
        assert_eq!(store.purge_at(hs.expires_at + 1).await.unwrap().handshakes, 1);
        assert!(store.get_handshake(&hs.id).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn incremental_upload_commits_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut upload = store.begin_share(new_share("parts.bin")).await.unwrap();
        let id = upload.id().to_string();
        upload.write(b"frame-1|".to_vec()).await.unwrap();
        upload.write(b"frame-2".to_vec()).await.unwrap();
        assert_eq!(upload.size(), 15);
        assert!(store.get_share(&id).unwrap_err().is_not_found());

        let share = upload.commit().await.unwrap();
        assert_eq!(share.id, id);
        assert_eq!(share.size, 15);
        assert_eq!(store.fetch_object(&share).await.unwrap().as_ref(), b"frame-1|frame-2");
    }

    #[tokio::test]
    async fn aborted_upload_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut upload = store.begin_share(new_share("half.bin")).await.unwrap();
        let id = upload.id().to_string();
        upload.write(b"partial".to_vec()).await.unwrap();
        upload.abort().await;

        assert!(store.get_share(&id).unwrap_err().is_not_found());
        assert!(!store.objects().exists(&locator_for(&id)).await.unwrap());
    }

    #[tokio::test]
    async fn reader_upload_and_object_reader_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let blob: Vec<u8> = (0..(3 * UPLOAD_PIECE + 5)).map(|i| (i % 241) as u8).collect();

        let share = store
            .create_share_from_reader(new_share("sealed.bin"), std::io::Cursor::new(blob.clone()))
            .await
            .unwrap();
        assert_eq!(share.size, blob.len() as u64);

        let mut object = store.open_object(&share).await.unwrap();
        let mut back = Vec::new();
        loop {
            let part = object.read_up_to(65_552).await.unwrap();
            if part.is_empty() {
                break;
            }
            back.extend_from_slice(&part);
        }
        assert_eq!(back, blob);
    }

    #[tokio::test]
    async fn handshake_codes_stored_in_canonical_form() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let hs = store
            .create_handshake(NewHandshake {
                code: "  otter\n".into(),
                receiver_public_key: "pk".into(),
                ttl: Duration::from_secs(30),
            })
            .unwrap();
        assert_eq!(hs.code, records::code_key("Otter"));
        assert_eq!(store.get_handshake_by_code("OTTER").unwrap().id, hs.id);

        let err = store
            .create_handshake(NewHandshake {
                code: "OTTER".into(),
                receiver_public_key: "pk".into(),
                ttl: Duration::from_secs(30),
            })
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
    }
}
