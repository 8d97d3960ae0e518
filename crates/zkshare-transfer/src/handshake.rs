//! Code-paired key exchange.
//!
//! ```text
//! receiver: Receiver::start ── code ──▶ (out of band) ──▶ Sender::connect
//!           wait_for_sender ◀── sender_public_key ──────── (paired)
//!           phrase == phrase, checked by humans, both confirm
//!           wait_for_share  ◀── share_id + filename ─────── send (completed)
//! ```
//!
//! Both sides talk only to the [`LifecycleStore`]. Each side's state is a
//! separate type, so a session cannot send or receive before the phrase has
//! been confirmed.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zkshare_core::config::HandshakeConfig;
use zkshare_core::{now_secs, Handshake, Share, ShareError, ShareResult};
use zkshare_crypto::words::is_word;
use tokio::io::{AsyncRead, AsyncWrite};
use zkshare_crypto::{normalize_code, random_word, verification_phrase, KeyPair, ShareKey};
use zkshare_store::{LifecycleStore, NewHandshake};

use crate::direct::{ReceivedFile, ShareOptions};
use crate::pipe;
use crate::poll::wait_until;

#[derive(Debug, Clone)]
pub struct HandshakeOptions {
    /// Lifetime of the handshake row
    pub ttl: Duration,
    pub poll_interval: Duration,
    /// Bound on each wait for the peer
    pub poll_timeout: Duration,
    /// Random codes tried before giving up on a collision streak
    pub code_attempts: u32,
}

impl From<&HandshakeConfig> for HandshakeOptions {
    fn from(cfg: &HandshakeConfig) -> Self {
        Self {
            ttl: cfg.ttl(),
            poll_interval: cfg.poll_interval(),
            poll_timeout: cfg.poll_timeout(),
            code_attempts: cfg.code_attempts,
        }
    }
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self::from(&HandshakeConfig::default())
    }
}

// ── Receiver ─────────────────────────────────────────────────────────────

/// Receiver waiting for a sender to enter its code
pub struct Receiver {
    store: LifecycleStore,
    opts: HandshakeOptions,
    keys: KeyPair,
    handshake: Handshake,
}

impl Receiver {
    /// Open a handshake under a random pairing code, retrying on collision.
    pub fn start(store: LifecycleStore, opts: HandshakeOptions) -> ShareResult<Self> {
        let keys = KeyPair::generate();
        for attempt in 1..=opts.code_attempts {
            let code = random_word();
            match create(&store, code, &keys, &opts) {
                Ok(handshake) => return Ok(Self::new(store, opts, keys, handshake)),
                Err(e) if e.is_conflict() => {
                    debug!(code, attempt, "pairing code taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ShareError::Conflict(format!(
            "no free pairing code after {} attempts",
            opts.code_attempts
        )))
    }

    /// Open a handshake under a caller-chosen code. `Conflict` if it is taken.
    pub fn start_with_code(
        store: LifecycleStore,
        code: &str,
        opts: HandshakeOptions,
    ) -> ShareResult<Self> {
        if !is_word(code) {
            return Err(ShareError::InvalidInput(format!(
                "{code:?} is not a pairing word"
            )));
        }
        let keys = KeyPair::generate();
        let handshake = create(&store, code, &keys, &opts)?;
        Ok(Self::new(store, opts, keys, handshake))
    }

    fn new(store: LifecycleStore, opts: HandshakeOptions, keys: KeyPair, handshake: Handshake) -> Self {
        info!(handshake_id = %handshake.id, code = %handshake.code, "waiting for sender");
        Self {
            store,
            opts,
            keys,
            handshake,
        }
    }

    /// The code to read out to the sender
    pub fn code(&self) -> &str {
        &self.handshake.code
    }

    pub fn handshake_id(&self) -> &str {
        &self.handshake.id
    }

    /// Wait until a sender has published its key, then derive the shared secret.
    pub async fn wait_for_sender(self, cancel: &CancellationToken) -> ShareResult<VerifiedSession> {
        let id = self.handshake.id.clone();
        let sender_key = wait_until(
            self.opts.poll_interval,
            self.opts.poll_timeout,
            cancel,
            || Ok(live_handshake(&self.store, &id)?.sender_public_key),
        )
        .await?;

        let secret = self.keys.agree(&sender_key)?;
        let phrase = verification_phrase(&secret);
        debug!(handshake_id = %id, "paired with sender");
        Ok(VerifiedSession {
            store: self.store,
            opts: self.opts,
            handshake_id: id,
            secret,
            phrase,
        })
    }
}

fn create(
    store: &LifecycleStore,
    code: &str,
    keys: &KeyPair,
    opts: &HandshakeOptions,
) -> ShareResult<Handshake> {
    store.create_handshake(NewHandshake {
        code: normalize_code(code),
        receiver_public_key: keys.public_key_base64(),
        ttl: opts.ttl,
    })
}

/// Receiver holding the shared secret, awaiting the human phrase check
pub struct VerifiedSession {
    store: LifecycleStore,
    opts: HandshakeOptions,
    handshake_id: String,
    secret: ShareKey,
    phrase: String,
}

impl VerifiedSession {
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// A mismatch aborts the handshake and frees its code.
    pub fn confirm(self, phrases_match: bool) -> ShareResult<ConfirmedReceiver> {
        if !phrases_match {
            abort(&self.store, &self.handshake_id);
            return Err(ShareError::VerificationMismatch);
        }
        Ok(ConfirmedReceiver {
            store: self.store,
            opts: self.opts,
            handshake_id: self.handshake_id,
            secret: self.secret,
        })
    }
}

pub struct ConfirmedReceiver {
    store: LifecycleStore,
    opts: HandshakeOptions,
    handshake_id: String,
    secret: ShareKey,
}

impl ConfirmedReceiver {
    /// Wait for the sender's upload, then fetch and decrypt it.
    ///
    /// The handshake row is consumed on success.
    pub async fn wait_for_share(self, cancel: &CancellationToken) -> ShareResult<ReceivedFile> {
        let mut data = Vec::new();
        let share = self.wait_for_share_into(cancel, &mut data).await?;
        Ok(ReceivedFile {
            share_id: share.id,
            filename: share.filename,
            data,
        })
    }

    /// Like [`wait_for_share`](Self::wait_for_share), streaming plaintext
    /// chunks into `writer` as each frame authenticates.
    pub async fn wait_for_share_into<W: AsyncWrite + Unpin>(
        self,
        cancel: &CancellationToken,
        writer: &mut W,
    ) -> ShareResult<Share> {
        let id = self.handshake_id.as_str();
        let (share_id, filename) = wait_until(
            self.opts.poll_interval,
            self.opts.poll_timeout,
            cancel,
            || {
                let hs = live_handshake(&self.store, id)?;
                Ok(hs.share_id.zip(hs.filename))
            },
        )
        .await?;

        let mut share = self.store.consume_download(&share_id)?;
        let size = pipe::open_from_store(&self.store, &share, &self.secret, writer).await?;

        if let Err(e) = self.store.delete_handshake(id) {
            if !e.is_not_found() {
                warn!(handshake_id = %id, "failed to remove completed handshake: {e}");
            }
        }
        info!(handshake_id = %id, share_id = %share_id, size, "file received");
        share.filename = filename;
        Ok(share)
    }
}

// ── Sender ───────────────────────────────────────────────────────────────

pub struct Sender;

impl Sender {
    /// Join the handshake behind `code` and publish a fresh public key.
    pub fn connect(
        store: LifecycleStore,
        code: &str,
        opts: HandshakeOptions,
    ) -> ShareResult<PairedSender> {
        let handshake = store.get_handshake_by_code(code)?;
        if handshake.is_expired(now_secs()) {
            return Err(ShareError::Expired(format!("handshake {}", handshake.code)));
        }

        let keys = KeyPair::generate();
        let secret = keys.agree(&handshake.receiver_public_key)?;
        store.set_sender_public_key(&handshake.id, &keys.public_key_base64())?;

        let phrase = verification_phrase(&secret);
        info!(handshake_id = %handshake.id, "paired with receiver");
        Ok(PairedSender {
            store,
            opts,
            handshake_id: handshake.id,
            secret,
            phrase,
        })
    }
}

/// Sender holding the shared secret, awaiting the human phrase check
pub struct PairedSender {
    store: LifecycleStore,
    opts: HandshakeOptions,
    handshake_id: String,
    secret: ShareKey,
    phrase: String,
}

impl PairedSender {
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn handshake_id(&self) -> &str {
        &self.handshake_id
    }

    /// A mismatch aborts the handshake and frees its code.
    pub fn confirm(self, phrases_match: bool) -> ShareResult<ConfirmedSender> {
        if !phrases_match {
            abort(&self.store, &self.handshake_id);
            return Err(ShareError::VerificationMismatch);
        }
        Ok(ConfirmedSender {
            store: self.store,
            opts: self.opts,
            handshake_id: self.handshake_id,
            secret: self.secret,
        })
    }
}

pub struct ConfirmedSender {
    store: LifecycleStore,
    opts: HandshakeOptions,
    handshake_id: String,
    secret: ShareKey,
}

impl ConfirmedSender {
    /// Seal under the shared secret, upload, and link the share to the handshake.
    ///
    /// Passwords are rejected: the phrase check already authenticates the peer.
    pub async fn send(
        self,
        filename: &str,
        plaintext: &[u8],
        share_opts: &ShareOptions,
    ) -> ShareResult<Share> {
        self.send_reader(filename, plaintext, share_opts).await
    }

    /// Like [`send`](Self::send), reading plaintext from `reader` one chunk
    /// at a time.
    pub async fn send_reader<R: AsyncRead + Unpin>(
        self,
        filename: &str,
        reader: R,
        share_opts: &ShareOptions,
    ) -> ShareResult<Share> {
        if share_opts.password.is_some() {
            return Err(ShareError::InvalidInput(
                "handshake shares cannot carry a password".into(),
            ));
        }
        live_handshake(&self.store, &self.handshake_id)?;

        let mut new = share_opts.to_new_share(filename)?;
        if new.expires_in.is_none() {
            new.expires_in = Some(self.opts.ttl);
        }
        let share = pipe::seal_into_store(&self.store, &self.secret, new, reader).await?;

        if let Err(e) = self.store.link_share(&self.handshake_id, &share.id, &share.filename) {
            if let Err(cleanup) = self.store.revoke(&share.id).await {
                warn!(share_id = %share.id, "failed to revoke unlinked share: {cleanup}");
            }
            return Err(e);
        }
        info!(handshake_id = %self.handshake_id, share_id = %share.id, "file sent");
        Ok(share)
    }
}

/// Read a handshake, treating an expired row as gone.
fn live_handshake(store: &LifecycleStore, id: &str) -> ShareResult<Handshake> {
    let hs = store.get_handshake(id)?;
    if hs.is_expired(now_secs()) {
        return Err(ShareError::Expired(format!("handshake {}", hs.code)));
    }
    Ok(hs)
}

fn abort(store: &LifecycleStore, id: &str) {
    warn!(handshake_id = %id, "verification phrase mismatch, aborting");
    match store.delete_handshake(id) {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!(handshake_id = %id, "failed to remove aborted handshake: {e}"),
    }
}
