use serde::{Deserialize, Serialize};
use stowage_store::Identity;

use crate::EncryptError;

/// Fixed chunk size. All chunks of a stream share this size except the
/// last, which holds the remainder.
pub const CHUNK_SIZE: u32 = 1024 * 1024;

/// Streams at or below this length are held inline in the DataMap
/// instead of being chunked out to the store.
pub const MAX_INLINE_CONTENT: usize = 4096;

/// Fingerprint of one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDetail {
    /// Store key of the encrypted chunk blob.
    pub id: Identity,
    /// BLAKE3 hash of the chunk plaintext; the decryption key is derived
    /// from it.
    pub src_hash: [u8; 32],
    /// Plaintext length of the chunk.
    pub size: u32,
}

/// The recipe for reassembling one byte stream: an ordered list of chunk
/// fingerprints plus any residual content kept in-band.
///
/// A DataMap is small enough to embed in metadata records and to ship to
/// other parties; holding a DataMap (and the store its chunks live in)
/// is holding the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DataMap {
    chunks: Vec<ChunkDetail>,
    content: Vec<u8>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(chunks: Vec<ChunkDetail>, content: Vec<u8>) -> Self {
        Self { chunks, content }
    }

    pub fn chunks(&self) -> &[ChunkDetail] {
        &self.chunks
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Total plaintext length described by this map.
    ///
    /// Chunked streams are uniform except for the trailing chunk, so the
    /// length is `(n - 1) * chunks[0].size + last.size`; inline streams
    /// are just the residual content length.
    pub fn len(&self) -> u64 {
        match (self.chunks.first(), self.chunks.last()) {
            (Some(first), Some(last)) => {
                (self.chunks.len() as u64 - 1) * first.size as u64 + last.size as u64
            }
            _ => self.content.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize a DataMap to its wire form.
pub fn serialize_data_map(data_map: &DataMap) -> Result<Vec<u8>, EncryptError> {
    Ok(bincode::serialize(data_map)?)
}

/// Parse a DataMap from its wire form.
pub fn parse_data_map(bytes: &[u8]) -> Result<DataMap, EncryptError> {
    Ok(bincode::deserialize(bytes)?)
}
