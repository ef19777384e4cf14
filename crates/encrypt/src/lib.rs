//! Self-encryption codec.
//!
//! Turns a byte stream into content-addressed encrypted chunks plus a
//! `DataMap` describing how to reassemble it, and wraps directory
//! DataMaps in an AEAD envelope keyed from the directory's lineage.
//! Chunk encryption is convergent: the key is derived from the chunk's
//! own plaintext hash, so identical content produces identical blobs
//! regardless of who stores it.

mod data_map;
mod envelope;
mod self_encryptor;

pub use data_map::{
    parse_data_map, serialize_data_map, ChunkDetail, DataMap, CHUNK_SIZE, MAX_INLINE_CONTENT,
};
pub use envelope::{decrypt_data_map, encrypt_data_map};
pub use self_encryptor::SelfEncryptor;

use stowage_store::StoreError;

/// Errors that can occur in the codec.
#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("cipher failure")]
    Crypto,
    #[error("malformed serialized form: {0}")]
    Codec(#[from] bincode::Error),
}
