//! Link sharing: the sender holds the key, the server holds only ciphertext.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;
use zkshare_core::config::SharesConfig;
use zkshare_core::{now_secs, Share, ShareError, ShareResult, ShareStatus};
use zkshare_crypto::{hash_password, verify_password, ShareKey};
use zkshare_store::{LifecycleStore, NewShare};

use crate::pipe;

/// Sender-side limits for a new share
#[derive(Debug, Clone, Default)]
pub struct ShareOptions {
    /// `None` never expires unless `max_ttl` is set
    pub expires_in: Option<Duration>,
    /// `None` or `Some(0)` is unlimited
    pub max_downloads: Option<u64>,
    pub password: Option<SecretString>,
    /// Upper bound applied to `expires_in`
    pub max_ttl: Option<Duration>,
}

impl ShareOptions {
    /// Deployment defaults. Zero in the config means "no limit".
    pub fn from_config(cfg: &SharesConfig) -> Self {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Self {
            expires_in: secs(cfg.default_ttl_secs),
            max_downloads: (cfg.default_max_downloads > 0).then_some(cfg.default_max_downloads),
            password: None,
            max_ttl: secs(cfg.max_ttl_secs),
        }
    }

    pub fn effective_ttl(&self) -> Option<Duration> {
        match (self.expires_in, self.max_ttl) {
            (Some(ttl), Some(max)) => Some(ttl.min(max)),
            (None, Some(max)) => Some(max),
            (ttl, None) => ttl,
        }
    }

    pub(crate) fn to_new_share(&self, filename: &str) -> ShareResult<NewShare> {
        let password_hash = match &self.password {
            Some(pw) if !pw.expose_secret().is_empty() => Some(hash_password(pw.expose_secret())?),
            _ => None,
        };
        Ok(NewShare {
            filename: filename.to_string(),
            expires_in: self.effective_ttl(),
            max_downloads: self.max_downloads,
            password_hash,
            key_material: None,
        })
    }
}

/// Decrypted payload of a share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub share_id: String,
    pub filename: String,
    pub data: Vec<u8>,
}

/// Seal `plaintext` with the chunked codec and publish it as a share.
pub async fn share_bytes(
    store: &LifecycleStore,
    key: &ShareKey,
    filename: &str,
    plaintext: &[u8],
    opts: &ShareOptions,
) -> ShareResult<Share> {
    share_reader(store, key, filename, plaintext, opts).await
}

/// Seal a stream chunk by chunk into storage and publish it as a share.
///
/// Memory stays at one chunk regardless of input size.
pub async fn share_reader<R>(
    store: &LifecycleStore,
    key: &ShareKey,
    filename: &str,
    reader: R,
    opts: &ShareOptions,
) -> ShareResult<Share>
where
    R: AsyncRead + Unpin,
{
    let new = opts.to_new_share(filename)?;
    pipe::seal_into_store(store, key, new, reader).await
}

/// Fetch and decrypt a share, counting one download.
///
/// Expired and exhausted shares fail with `Expired` / `Exhausted` rather than
/// `NotFound`. The ceiling is checked again inside the counting write, so
/// concurrent downloaders cannot exceed `max_downloads`.
pub async fn download(
    store: &LifecycleStore,
    id: &str,
    key: &ShareKey,
    password: Option<&str>,
) -> ShareResult<ReceivedFile> {
    let mut data = Vec::new();
    let share = download_to(store, id, key, password, &mut data).await?;
    Ok(ReceivedFile {
        share_id: share.id,
        filename: share.filename,
        data,
    })
}

/// Like [`download`], but decrypts chunk by chunk into `writer`.
///
/// Returns the share as counted. On error, whatever reached `writer` must be
/// discarded.
pub async fn download_to<W>(
    store: &LifecycleStore,
    id: &str,
    key: &ShareKey,
    password: Option<&str>,
    writer: &mut W,
) -> ShareResult<Share>
where
    W: AsyncWrite + Unpin,
{
    let share = store.get_share(id)?;
    check_available(&share, now_secs())?;

    if let Some(phc) = share.password_hash.as_deref() {
        let given = password.ok_or(ShareError::PasswordRequired)?;
        if !verify_password(given, phc)? {
            return Err(ShareError::InvalidPassword);
        }
    }

    let share = store.consume_download(id)?;
    let written = pipe::open_from_store(store, &share, key, writer).await?;

    info!(
        share_id = %share.id,
        size = written,
        downloads = share.download_count,
        remaining = ?share.remaining_downloads(),
        "share downloaded"
    );
    Ok(share)
}

fn check_available(share: &Share, now: u64) -> ShareResult<()> {
    match share.status(now) {
        ShareStatus::Active => Ok(()),
        ShareStatus::Expired => Err(ShareError::Expired(format!("share {}", share.id))),
        ShareStatus::Exhausted => Err(ShareError::Exhausted(format!("share {}", share.id))),
    }
}
