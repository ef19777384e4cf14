//! Keyed blob storage for stowage.
//!
//! Everything the drive persists (directory envelopes, credential
//! indirection records and self-encrypted chunks) goes through the
//! `Store` trait defined here. Two backends are provided: an in-memory
//! map for tests and short-lived sessions, and a directory-of-files
//! store for anything that should survive the process.

mod fs;
mod identity;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use fs::FsStore;
pub use identity::{Identity, IdentityError, IDENTITY_SIZE};
pub use memory::MemoryStore;

/// Errors reported by a blob store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("blob not found")]
    Missing,
    #[error("store capacity exceeded")]
    Full,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A keyed blob store.
///
/// Keys are 64-byte [`Identity`] values; payloads are opaque bytes.
/// `put` is an idempotent overwrite, `get` fails with
/// [`StoreError::Missing`] for an absent key, and `delete` of an absent
/// key is a no-op. The store enforces its own disk-usage bound and
/// reports usage through the two counters.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Persist `data` under `key`, replacing any previous value.
    async fn put(&self, key: Identity, data: Bytes) -> Result<(), StoreError>;

    /// Fetch the blob stored under `key`.
    async fn get(&self, key: &Identity) -> Result<Bytes, StoreError>;

    /// Remove the blob stored under `key`, if any.
    async fn delete(&self, key: &Identity) -> Result<(), StoreError>;

    /// Total bytes currently held.
    async fn current_disk_usage(&self) -> u64;

    /// Configured capacity in bytes.
    fn max_disk_usage(&self) -> u64;
}
