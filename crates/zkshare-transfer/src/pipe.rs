//! Chunked codec wired straight to object storage.
//!
//! Upload seals one 64 KiB chunk at a time into a [`ShareUpload`]; download
//! pulls one frame at a time out of an [`ObjectReader`]. Neither side holds
//! more than a frame plus the storage read window.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zkshare_core::{Share, ShareError, ShareResult};
use zkshare_crypto::stream::{StreamOpener, StreamSealer, MAX_FRAME_CIPHERTEXT};
use zkshare_crypto::{ShareKey, CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};
use zkshare_store::{LifecycleStore, NewShare, ShareUpload};

/// Seal everything from `reader` into a new share.
pub(crate) async fn seal_into_store<R>(
    store: &LifecycleStore,
    key: &ShareKey,
    new: NewShare,
    mut reader: R,
) -> ShareResult<Share>
where
    R: AsyncRead + Unpin,
{
    let mut upload = store.begin_share(new).await?;
    match seal_frames(&mut upload, key, &mut reader).await {
        Ok(chunks) => {
            tracing::debug!(share_id = %upload.id(), chunks, sealed = upload.size(), "sealed upload");
            upload.commit().await
        }
        Err(e) => {
            upload.abort().await;
            Err(e)
        }
    }
}

async fn seal_frames<R>(upload: &mut ShareUpload, key: &ShareKey, reader: &mut R) -> ShareResult<u64>
where
    R: AsyncRead + Unpin,
{
    let mut sealer = StreamSealer::new(key);
    upload.write(sealer.header().to_vec()).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut chunks = 0u64;
    while !sealer.is_finished() {
        let n = read_full(reader, &mut buf).await?;
        let frame = sealer.seal_chunk(&buf[..n])?;
        upload.write(frame).await?;
        chunks += 1;
    }
    Ok(chunks)
}

/// Decrypt a share's object into `writer`. Returns plaintext bytes written.
///
/// Plaintext reaches `writer` chunk by chunk as each one authenticates; on
/// error the caller must discard what was written.
pub(crate) async fn open_from_store<W>(
    store: &LifecycleStore,
    share: &Share,
    key: &ShareKey,
    writer: &mut W,
) -> ShareResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut object = store.open_object(share).await?;

    let header: [u8; NONCE_SIZE] = object
        .read_up_to(NONCE_SIZE)
        .await?
        .as_ref()
        .try_into()
        .map_err(|_| ShareError::AuthenticationFailure)?;
    let mut opener = StreamOpener::new(key, &header);

    let mut written = 0u64;
    loop {
        let prefix = object.read_up_to(4).await?;
        if prefix.is_empty() {
            break;
        }
        let prefix: [u8; 4] = prefix
            .as_ref()
            .try_into()
            .map_err(|_| ShareError::AuthenticationFailure)?;
        let len = u32::from_be_bytes(prefix) as usize;
        if !(TAG_SIZE..=MAX_FRAME_CIPHERTEXT).contains(&len) {
            return Err(ShareError::AuthenticationFailure);
        }

        let body = object.read_up_to(NONCE_SIZE + len).await?;
        if body.len() != NONCE_SIZE + len {
            return Err(ShareError::AuthenticationFailure);
        }
        let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
        let plaintext = opener.open_frame(nonce, ciphertext)?;
        writer.write_all(&plaintext).await?;
        written += plaintext.len() as u64;
    }

    opener.finish()?;
    writer.flush().await?;
    Ok(written)
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zkshare_crypto::{generate_key, open_chunked};
    use zkshare_storage::{memory_operator, ObjectStore};
    use zkshare_store::JsonRecordStore;

    fn lifecycle(dir: &tempfile::TempDir) -> LifecycleStore {
        let records = JsonRecordStore::open(&dir.path().join("records.json")).unwrap();
        LifecycleStore::new(Arc::new(records), ObjectStore::new(memory_operator().unwrap()))
    }

    fn named(name: &str) -> NewShare {
        NewShare {
            filename: name.into(),
            ..Default::default()
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn streamed_object_matches_in_memory_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = lifecycle(&dir);
        let key = generate_key();
        let data = payload(2 * CHUNK_SIZE + 9);

        let share = seal_into_store(&store, &key, named("x"), &data[..]).await.unwrap();
        assert_eq!(share.size, zkshare_crypto::stream::sealed_len(data.len() as u64));

        let blob = store.fetch_object(&share).await.unwrap();
        assert_eq!(open_chunked(&key, &blob).unwrap(), data);
    }

    #[tokio::test]
    async fn exact_chunk_multiple_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = lifecycle(&dir);
        let key = generate_key();
        for len in [0, CHUNK_SIZE, 3 * CHUNK_SIZE] {
            let data = payload(len);
            let share = seal_into_store(&store, &key, named("x"), &data[..]).await.unwrap();
            let mut out = Vec::new();
            let n = open_from_store(&store, &share, &key, &mut out).await.unwrap();
            assert_eq!(n, len as u64);
            assert_eq!(out, data);
        }
    }

    #[tokio::test]
    async fn truncated_object_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let store = lifecycle(&dir);
        let key = generate_key();
        let data = payload(CHUNK_SIZE + 100);
        let share = seal_into_store(&store, &key, named("x"), &data[..]).await.unwrap();

        // drop the final short frame: the stream now ends on a full chunk
        let blob = store.fetch_object(&share).await.unwrap();
        let last_frame = 4 + NONCE_SIZE + 100 + TAG_SIZE;
        store
            .objects()
            .put(&share.storage_locator, blob.slice(..blob.len() - last_frame))
            .await
            .unwrap();

        let err = open_from_store(&store, &share, &key, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::AuthenticationFailure));
    }

    #[tokio::test]
    async fn flipped_bit_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let store = lifecycle(&dir);
        let key = generate_key();
        let share = seal_into_store(&store, &key, named("x"), &payload(5000)[..])
            .await
            .unwrap();

        let mut blob = store.fetch_object(&share).await.unwrap().to_vec();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        store.objects().put(&share.storage_locator, blob).await.unwrap();

        let err = open_from_store(&store, &share, &key, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::AuthenticationFailure));
    }
}
