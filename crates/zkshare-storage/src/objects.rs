//! Encrypted object access by storage locator

use bytes::{Bytes, BytesMut};
use opendal::{ErrorKind, Operator, Reader, Writer};
use zkshare_core::{ShareError, ShareResult};

/// Bytes fetched per range request by [`ObjectReader`]
pub const READ_WINDOW: usize = 256 * 1024;

/// Object key for a share's encrypted blob
pub fn locator_for(share_id: &str) -> String {
    format!("shares/{share_id}.bin")
}

/// Thin handle over an [`Operator`] that speaks [`ShareError`].
#[derive(Clone, Debug)]
pub struct ObjectStore {
    op: Operator,
}

impl ObjectStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Store a complete blob. Returns its size.
    pub async fn put(&self, locator: &str, data: impl Into<Bytes>) -> ShareResult<u64> {
        validate_locator(locator)?;
        let data: Bytes = data.into();
        let size = data.len() as u64;
        self.op
            .write(locator, data)
            .await
            .map_err(|e| storage_err(locator, e))?;
        tracing::debug!(locator, size, "object stored");
        Ok(size)
    }

    /// Open a writer for incremental upload (e.g. one frame at a time).
    /// The caller must `close()` it for the object to become visible.
    pub async fn writer(&self, locator: &str) -> ShareResult<Writer> {
        validate_locator(locator)?;
        self.op
            .writer(locator)
            .await
            .map_err(|e| storage_err(locator, e))
    }

    /// Open a sequential reader. Memory stays within one read window plus
    /// the largest single request.
    pub async fn reader(&self, locator: &str) -> ShareResult<ObjectReader> {
        validate_locator(locator)?;
        let size = self.size(locator).await?;
        let inner = self
            .op
            .reader(locator)
            .await
            .map_err(|e| storage_err(locator, e))?;
        Ok(ObjectReader {
            locator: locator.to_string(),
            inner,
            size,
            offset: 0,
            buffered: BytesMut::new(),
        })
    }

    pub async fn get(&self, locator: &str) -> ShareResult<Bytes> {
        validate_locator(locator)?;
        let buf = self
            .op
            .read(locator)
            .await
            .map_err(|e| storage_err(locator, e))?;
        Ok(buf.to_bytes())
    }

    pub async fn size(&self, locator: &str) -> ShareResult<u64> {
        validate_locator(locator)?;
        let meta = self
            .op
            .stat(locator)
            .await
            .map_err(|e| storage_err(locator, e))?;
        Ok(meta.content_length())
    }

    pub async fn exists(&self, locator: &str) -> ShareResult<bool> {
        validate_locator(locator)?;
        self.op
            .exists(locator)
            .await
            .map_err(|e| storage_err(locator, e))
    }

    /// Delete an object. Deleting a missing object succeeds.
    pub async fn delete(&self, locator: &str) -> ShareResult<()> {
        validate_locator(locator)?;
        self.op
            .delete(locator)
            .await
            .map_err(|e| storage_err(locator, e))?;
        tracing::debug!(locator, "object deleted");
        Ok(())
    }
}

/// Forward-only reader over one object, fetched in [`READ_WINDOW`] ranges
pub struct ObjectReader {
    locator: String,
    inner: Reader,
    size: u64,
    offset: u64,
    buffered: BytesMut,
}

impl ObjectReader {
    /// Total object size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes not yet returned to the caller
    pub fn remaining(&self) -> u64 {
        self.size - self.offset + self.buffered.len() as u64
    }

    /// Return the next `n` bytes, or fewer at end of object. Empty means EOF.
    pub async fn read_up_to(&mut self, n: usize) -> ShareResult<Bytes> {
        while self.buffered.len() < n && self.offset < self.size {
            let want = (n - self.buffered.len()).max(READ_WINDOW) as u64;
            let end = self.offset.saturating_add(want).min(self.size);
            let chunk = self
                .inner
                .read(self.offset..end)
                .await
                .map_err(|e| storage_err(&self.locator, e))?;
            if chunk.is_empty() {
                return Err(ShareError::Storage(format!(
                    "{}: object shorter than its stated size",
                    self.locator
                )));
            }
            self.offset += chunk.len() as u64;
            self.buffered.extend_from_slice(&chunk.to_bytes());
        }
        let take = n.min(self.buffered.len());
        Ok(self.buffered.split_to(take).freeze())
    }
}

fn validate_locator(locator: &str) -> ShareResult<()> {
    if locator.is_empty()
        || locator.starts_with('/')
        || locator.ends_with('/')
        || locator.split('/').any(|seg| seg == ".." || seg == ".")
    {
        return Err(ShareError::InvalidInput(format!(
            "invalid storage locator: {locator:?}"
        )));
    }
    Ok(())
}

fn storage_err(locator: &str, e: opendal::Error) -> ShareError {
    if e.kind() == ErrorKind::NotFound {
        ShareError::NotFound(format!("object {locator}"))
    } else {
        ShareError::Storage(format!("{locator}: {e}"))
    }
}
