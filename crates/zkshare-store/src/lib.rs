//! zkshare-store: durable share and handshake records
//!
//! [`RecordStore`] is the metadata contract, with two backends:
//!   - **JSON** (default): one file, in-memory mirror, atomic temp+rename writes.
//!   - **RocksDB** (behind the `rocksdb` feature): embedded key-value store.
//!
//! [`LifecycleStore`] pairs records with their encrypted objects so that
//! revocation and the expiry sweep never leave one without the other.

pub mod json;
pub mod lifecycle;
pub mod records;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use json::JsonRecordStore;
pub use lifecycle::{LifecycleStore, NewHandshake, NewShare, PurgeReport, ShareUpload};
pub use records::{open_record_store, RecordStore};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksRecordStore;
