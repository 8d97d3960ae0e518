//! zkshare-storage: OpenDAL-backed storage for encrypted share blobs
//!
//! Objects are opaque ciphertext addressed by a storage locator; nothing here
//! knows how they were sealed.

pub mod health;
pub mod objects;
pub mod operator;

pub use health::{check_health, is_healthy};
pub use objects::{locator_for, ObjectReader, ObjectStore, READ_WINDOW};
pub use operator::{build_operator, memory_operator};
