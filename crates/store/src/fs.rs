use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Identity, Store, StoreError};

/// A blob store backed by a directory of files.
///
/// Each blob lives in a file named by the hex encoding of its key.
/// Usage is counted once at open time and tracked incrementally from
/// then on; the directory is assumed to be owned by a single store
/// instance at a time.
pub struct FsStore {
    root: PathBuf,
    used: RwLock<u64>,
    max: u64,
}

impl FsStore {
    /// Open (creating if necessary) a store rooted at `root`, bounded to
    /// `max` bytes.
    pub async fn open(root: impl AsRef<Path>, max: u64) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let mut used = 0;
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            used += entry.metadata().await?.len();
        }
        debug!("opened blob store at {:?}, {} bytes in use", root, used);

        Ok(Self {
            root,
            used: RwLock::new(used),
            max,
        })
    }

    fn blob_path(&self, key: &Identity) -> PathBuf {
        self.root.join(key.to_hex())
    }
}

#[async_trait]
impl Store for FsStore {
    async fn put(&self, key: Identity, data: Bytes) -> Result<(), StoreError> {
        let path = self.blob_path(&key);
        let mut used = self.used.write().await;

        let previous = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let next = *used - previous + data.len() as u64;
        if next > self.max {
            return Err(StoreError::Full);
        }

        tokio::fs::write(&path, &data).await?;
        *used = next;
        Ok(())
    }

    async fn get(&self, key: &Identity) -> Result<Bytes, StoreError> {
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::Missing),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &Identity) -> Result<(), StoreError> {
        let path = self.blob_path(key);
        let mut used = self.used.write().await;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                tokio::fs::remove_file(&path).await?;
                *used -= meta.len();
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    async fn current_disk_usage(&self) -> u64 {
        *self.used.read().await
    }

    fn max_disk_usage(&self) -> u64 {
        self.max
    }
}
