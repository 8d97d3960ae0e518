//! zkshare-transfer: end-to-end flows built on the codec and the lifecycle store
//!
//! - [`direct`]: seal bytes under a caller-held key and publish a share link.
//! - [`handshake`]: code-paired P-256 exchange with a human-checked phrase,
//!   coordinated only through the store.
//! - [`poll`]: the cancellable "wait until" primitive the handshake uses.

pub mod direct;
pub mod handshake;
mod pipe;
pub mod poll;

pub use direct::{download, download_to, share_bytes, share_reader, ReceivedFile, ShareOptions};
pub use handshake::{
    ConfirmedReceiver, ConfirmedSender, HandshakeOptions, PairedSender, Receiver, Sender,
    VerifiedSession,
};
pub use poll::wait_until;
