use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{Identity, Store, StoreError};

struct State {
    data: HashMap<Identity, Bytes>,
    used: u64,
}

/// An in-memory blob store.
///
/// All data is lost when the store is dropped. Useful for unit testing
/// and ephemeral sessions.
pub struct MemoryStore {
    state: RwLock<State>,
    max: u64,
}

impl MemoryStore {
    /// Create a store bounded to `max` bytes.
    pub fn new(max: u64) -> Self {
        Self {
            state: RwLock::new(State {
                data: HashMap::new(),
                used: 0,
            }),
            max,
        }
    }

    /// Create a store with an effectively unlimited bound.
    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }

    /// Number of blobs currently held.
    pub async fn len(&self) -> usize {
        self.state.read().await.data.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.data.is_empty()
    }

    /// Snapshot of all keys currently held.
    pub async fn keys(&self) -> Vec<Identity> {
        self.state.read().await.data.keys().copied().collect()
    }

    /// Check whether a blob exists without fetching it.
    pub async fn contains(&self, key: &Identity) -> bool {
        self.state.read().await.data.contains_key(key)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: Identity, data: Bytes) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let previous = state.data.get(&key).map(|b| b.len() as u64).unwrap_or(0);
        let next = state.used - previous + data.len() as u64;
        if next > self.max {
            return Err(StoreError::Full);
        }
        state.used = next;
        state.data.insert(key, data);
        Ok(())
    }

    async fn get(&self, key: &Identity) -> Result<Bytes, StoreError> {
        let state = self.state.read().await;
        state.data.get(key).cloned().ok_or(StoreError::Missing)
    }

    async fn delete(&self, key: &Identity) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(removed) = state.data.remove(key) {
            state.used -= removed.len() as u64;
        }
        Ok(())
    }

    async fn current_disk_usage(&self) -> u64 {
        self.state.read().await.used
    }

    fn max_disk_usage(&self) -> u64 {
        self.max
    }
}
