use std::sync::Arc;

use bytes::Bytes;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use stowage_store::{Identity, Store, IDENTITY_SIZE};
use tracing::debug;

use crate::data_map::{ChunkDetail, DataMap, CHUNK_SIZE, MAX_INLINE_CONTENT};
use crate::EncryptError;

const CHUNK_KEY_CONTEXT: &str = "stowage-encrypt 2024-06 chunk key";

fn chunk_key(src_hash: &[u8; 32]) -> Key {
    let derived = blake3::derive_key(CHUNK_KEY_CONTEXT, src_hash);
    *Key::from_slice(&derived)
}

fn chunk_id(ciphertext: &[u8]) -> Identity {
    let mut hasher = blake3::Hasher::new();
    hasher.update(ciphertext);
    let mut out = [0u8; IDENTITY_SIZE];
    hasher.finalize_xof().fill(&mut out);
    out.into()
}

fn encrypt_chunk(plaintext: &[u8]) -> Result<(ChunkDetail, Vec<u8>), EncryptError> {
    let src_hash = *blake3::hash(plaintext).as_bytes();
    let cipher = ChaCha20Poly1305::new(&chunk_key(&src_hash));
    // The key is unique per plaintext, so a fixed nonce is safe and
    // keeps the chunk blob deterministic (content-addressable).
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&[0u8; 12]), plaintext)
        .map_err(|_| EncryptError::Crypto)?;
    let detail = ChunkDetail {
        id: chunk_id(&ciphertext),
        src_hash,
        size: plaintext.len() as u32,
    };
    Ok((detail, ciphertext))
}

fn decrypt_chunk(detail: &ChunkDetail, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let cipher = ChaCha20Poly1305::new(&chunk_key(&detail.src_hash));
    cipher
        .decrypt(Nonce::from_slice(&[0u8; 12]), ciphertext)
        .map_err(|_| EncryptError::Crypto)
}

/// Random-access reader/writer over a [`DataMap`] and its backing store.
///
/// The encryptor materializes the full plaintext lazily on first access
/// and works against that buffer; `flush` re-chunks the buffer, stores
/// any new chunk blobs and drops the ones the updated map no longer
/// references. Nothing touches the store until a read forces a load or a
/// flush commits a mutation.
pub struct SelfEncryptor<S: Store> {
    store: Arc<S>,
    data_map: DataMap,
    buffer: Option<Vec<u8>>,
    dirty: bool,
}

impl<S: Store> SelfEncryptor<S> {
    pub fn new(data_map: DataMap, store: Arc<S>) -> Self {
        Self {
            store,
            data_map,
            buffer: None,
            dirty: false,
        }
    }

    /// The current map. Only reflects mutations once `flush` has run.
    pub fn data_map(&self) -> &DataMap {
        &self.data_map
    }

    /// Plaintext length, including unflushed mutations.
    pub fn size(&self) -> u64 {
        match &self.buffer {
            Some(buffer) => buffer.len() as u64,
            None => self.data_map.len(),
        }
    }

    async fn load(&mut self) -> Result<&mut Vec<u8>, EncryptError> {
        if self.buffer.is_none() {
            let mut assembled = Vec::with_capacity(self.data_map.len() as usize);
            if self.data_map.chunks().is_empty() {
                assembled.extend_from_slice(self.data_map.content());
            } else {
                for detail in self.data_map.chunks() {
                    let blob = self.store.get(&detail.id).await?;
                    assembled.extend_from_slice(&decrypt_chunk(detail, &blob)?);
                }
            }
            self.buffer = Some(assembled);
        }
        Ok(self.buffer.as_mut().expect("buffer just loaded"))
    }

    /// Read up to `len` bytes starting at `offset`. Reads past the end
    /// return the available prefix; reads at or past the end return
    /// nothing.
    pub async fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, EncryptError> {
        let buffer = self.load().await?;
        let start = (offset as usize).min(buffer.len());
        let end = start.saturating_add(len).min(buffer.len());
        Ok(buffer[start..end].to_vec())
    }

    /// Write `data` at `offset`, zero-filling any gap beyond the current
    /// end.
    pub async fn write(&mut self, data: &[u8], offset: u64) -> Result<(), EncryptError> {
        let buffer = self.load().await?;
        let end = offset as usize + data.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[offset as usize..end].copy_from_slice(data);
        self.dirty = true;
        Ok(())
    }

    /// Resize to `size`, zero-padding on growth.
    pub async fn truncate(&mut self, size: u64) -> Result<(), EncryptError> {
        let buffer = self.load().await?;
        buffer.resize(size as usize, 0);
        self.dirty = true;
        Ok(())
    }

    /// Commit pending mutations: re-chunk the buffer, store new chunks
    /// and delete the ones no longer referenced.
    pub async fn flush(&mut self) -> Result<(), EncryptError> {
        if !self.dirty {
            return Ok(());
        }
        let buffer = self.buffer.as_ref().expect("dirty implies loaded").clone();
        let buffer_len = buffer.len();

        let replaced = std::mem::take(&mut self.data_map);
        if buffer.len() <= MAX_INLINE_CONTENT {
            self.data_map = DataMap::from_parts(Vec::new(), buffer);
        } else {
            let mut chunks = Vec::with_capacity(buffer.len() / CHUNK_SIZE as usize + 1);
            for plain in buffer.chunks(CHUNK_SIZE as usize) {
                let (detail, ciphertext) = encrypt_chunk(plain)?;
                self.store.put(detail.id, Bytes::from(ciphertext)).await?;
                chunks.push(detail);
            }
            self.data_map = DataMap::from_parts(chunks, Vec::new());
        }

        // Drop chunks orphaned by the rewrite.
        for old in replaced.chunks() {
            if !self.data_map.chunks().iter().any(|c| c.id == old.id) {
                self.store.delete(&old.id).await?;
            }
        }

        debug!(
            "flushed {} bytes into {} chunks",
            buffer_len,
            self.data_map.chunks().len()
        );
        self.dirty = false;
        Ok(())
    }

    /// Delete every chunk blob this map references and reset the map.
    pub async fn delete_all_chunks(&mut self) -> Result<(), EncryptError> {
        for detail in self.data_map.chunks() {
            self.store.delete(&detail.id).await?;
        }
        self.data_map = DataMap::new();
        self.buffer = None;
        self.dirty = false;
        Ok(())
    }
}
