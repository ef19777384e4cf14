use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_encrypt::SelfEncryptor;
use stowage_store::Store;

use crate::error::DriveError;
use crate::meta::{DirectoryId, MetaData};

/// An open-file handle.
///
/// The context owns a copy of the file's metadata and, once any IO has
/// happened, a self-encryptor over its DataMap. Any mutating operation
/// (and the access-time bump on read) flips `content_changed`; at close
/// the drive writes the metadata copy back to the parent listing when
/// the flag is set. The handle is value-semantic: nothing it holds is
/// shared with a directory listing.
pub struct FileContext<S: Store> {
    pub(crate) meta: MetaData,
    pub(crate) encryptor: Option<SelfEncryptor<S>>,
    pub(crate) content_changed: bool,
    pub(crate) grandparent_id: DirectoryId,
    pub(crate) parent_id: DirectoryId,
    path: PathBuf,
    store: Arc<S>,
    pub(crate) closed: bool,
}

impl<S: Store> FileContext<S> {
    pub(crate) fn new(
        meta: MetaData,
        path: PathBuf,
        grandparent_id: DirectoryId,
        parent_id: DirectoryId,
        store: Arc<S>,
    ) -> Self {
        Self {
            meta,
            encryptor: None,
            content_changed: false,
            grandparent_id,
            parent_id,
            path,
            store,
            closed: false,
        }
    }

    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// The full relative path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parent_path(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn grandparent_id(&self) -> &DirectoryId {
        &self.grandparent_id
    }

    pub fn parent_id(&self) -> &DirectoryId {
        &self.parent_id
    }

    pub fn content_changed(&self) -> bool {
        self.content_changed
    }

    /// Attach (or retrieve) the encryptor over the file's DataMap.
    fn encryptor(&mut self) -> Result<&mut SelfEncryptor<S>, DriveError> {
        if self.closed {
            return Err(DriveError::StaleHandle);
        }
        if self.encryptor.is_none() {
            let data_map = self
                .meta
                .data_map()
                .ok_or_else(|| DriveError::invalid("handle does not refer to a file"))?
                .clone();
            self.encryptor = Some(SelfEncryptor::new(data_map, self.store.clone()));
        }
        Ok(self.encryptor.as_mut().expect("encryptor just attached"))
    }

    /// Current file size, preferring the live encryptor over the stored
    /// bookkeeping.
    pub fn size(&self) -> u64 {
        match &self.encryptor {
            Some(encryptor) => encryptor.size(),
            None => self.meta.end_of_file,
        }
    }

    /// Read up to `len` bytes at `offset`, bumping the access time.
    pub async fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, DriveError> {
        let data = self.encryptor()?.read(offset, len).await?;
        self.meta.last_access_time = time::OffsetDateTime::now_utc().unix_timestamp();
        self.content_changed = true;
        Ok(data)
    }

    /// Write `data` at `offset` and refresh the size bookkeeping.
    pub async fn write(&mut self, data: &[u8], offset: u64) -> Result<(), DriveError> {
        let encryptor = self.encryptor()?;
        encryptor.write(data, offset).await?;
        let size = encryptor.size();
        self.meta.end_of_file = size;
        self.meta.allocation_size = size;
        self.meta.update_last_write();
        self.meta.change_time = self.meta.last_write_time;
        self.content_changed = true;
        Ok(())
    }

    /// Resize the file, zero-padding on growth.
    pub async fn truncate(&mut self, size: u64) -> Result<(), DriveError> {
        let encryptor = self.encryptor()?;
        encryptor.truncate(size).await?;
        self.meta.end_of_file = size;
        self.meta.allocation_size = size;
        self.meta.update_last_write();
        self.meta.change_time = self.meta.last_write_time;
        self.content_changed = true;
        Ok(())
    }

    /// Commit pending content to the store and fold the resulting
    /// DataMap back into the metadata copy.
    pub async fn flush(&mut self) -> Result<(), DriveError> {
        if self.closed {
            return Err(DriveError::StaleHandle);
        }
        if let Some(encryptor) = self.encryptor.as_mut() {
            encryptor.flush().await?;
            let data_map = encryptor.data_map().clone();
            self.meta.set_data_map(data_map);
        }
        Ok(())
    }
}
