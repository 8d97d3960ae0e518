//! zkshare-core: entity types, config schema, and the error type shared by every zkshare crate

pub mod config;
pub mod error;
pub mod types;

pub use error::{ShareError, ShareResult};
pub use types::{now_secs, Handshake, HandshakeStatus, Share, ShareStatus};
