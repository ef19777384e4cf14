use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use stowage_encrypt::{parse_data_map, serialize_data_map, SelfEncryptor};
use stowage_store::Store;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error};

use crate::error::DriveError;
use crate::file::FileContext;
use crate::meta::{DirectoryId, MetaData};
use crate::names;
use crate::session::Credentials;
use crate::tree::{DirectoryHandler, ROOT_NAME};

/// How long [`Drive::wait_until_mounted`] waits before giving up.
const MOUNT_WAIT: Duration = Duration::from_secs(10);

/// Mount lifecycle stages, driven by the OS adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountStage {
    Initialised,
    Mounted,
    Unmounted,
}

/// Static drive configuration.
#[derive(Debug, Clone, Default)]
pub struct DriveConfig {
    /// Where the OS adapter exposes the drive. Informational to the
    /// core; adapters use it to relativize callback paths.
    pub mount_dir: PathBuf,
}

type RenameObserver = Box<dyn Fn(&Path, &Path) + Send + Sync>;

/// Split a relative path into its parent path and final name component.
/// The root slot `/` has the empty path (the root-parent) as its parent.
fn split_path(path: &Path) -> Result<(PathBuf, String), DriveError> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            Ok((parent.to_path_buf(), name.to_string_lossy().into_owned()))
        }
        _ if path == Path::new(ROOT_NAME) => Ok((PathBuf::new(), ROOT_NAME.to_string())),
        _ => Err(DriveError::invalid("empty path")),
    }
}

/// The mount-facing surface of the drive.
///
/// One coarse mutex serializes the public operations; the OS adapter may
/// additionally serialize its callbacks but the core does not assume it.
/// All tree state lives in the store, reachable from the credentialed
/// session established at construction.
pub struct Drive<S: Store> {
    handler: DirectoryHandler<S>,
    store: Arc<S>,
    config: DriveConfig,
    api_lock: Mutex<()>,
    mount_state: watch::Sender<MountStage>,
    rename_observer: Option<RenameObserver>,
}

impl<S: Store> Drive<S> {
    /// Bootstrap a drive: establishes (or recovers) the credentialed
    /// session and, on first run, creates the root directories.
    pub async fn new(
        store: Arc<S>,
        credentials: &Credentials,
        config: DriveConfig,
    ) -> Result<Self, DriveError> {
        let handler = DirectoryHandler::new(store.clone(), credentials).await?;
        let (mount_state, _) = watch::channel(MountStage::Initialised);
        Ok(Self {
            handler,
            store,
            config,
            api_lock: Mutex::new(()),
            mount_state,
            rename_observer: None,
        })
    }

    pub fn unique_user_id(&self) -> &DirectoryId {
        self.handler.unique_user_id()
    }

    pub fn root_parent_id(&self) -> &DirectoryId {
        self.handler.root_parent_id()
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Reported store bounds: `(max, current)` bytes.
    pub async fn disk_usage(&self) -> (u64, u64) {
        (
            self.store.max_disk_usage(),
            self.store.current_disk_usage().await,
        )
    }

    /// Register the hook invoked after a rename becomes externally
    /// visible.
    pub fn set_rename_observer(
        &mut self,
        observer: impl Fn(&Path, &Path) + Send + Sync + 'static,
    ) {
        self.rename_observer = Some(Box::new(observer));
    }

    // ---- mount state ------------------------------------------------

    /// Adapter callback: the drive went (un)mounted. Unmounting an
    /// already-unmounted drive is a no-op.
    pub fn set_mount_state(&self, mounted: bool) {
        let stage = if mounted {
            MountStage::Mounted
        } else {
            MountStage::Unmounted
        };
        self.mount_state.send_replace(stage);
    }

    /// Wait (bounded) for the adapter to report the drive mounted.
    /// Returns false on timeout.
    pub async fn wait_until_mounted(&self) -> bool {
        let mut rx = self.mount_state.subscribe();
        tokio::time::timeout(MOUNT_WAIT, rx.wait_for(|stage| *stage == MountStage::Mounted))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }

    /// Wait (unbounded) for the adapter to report the drive unmounted.
    pub async fn wait_until_unmounted(&self) {
        let mut rx = self.mount_state.subscribe();
        let _ = rx.wait_for(|stage| *stage == MountStage::Unmounted).await;
    }

    // ---- metadata and tree operations -------------------------------

    async fn get_meta_data_inner(
        &self,
        path: &Path,
    ) -> Result<(MetaData, DirectoryId, DirectoryId), DriveError> {
        let (parent_path, name) = split_path(path)?;
        let parent = self.handler.get_from_path(&parent_path).await?;
        let meta = parent.listing.get_child(&name)?.clone();
        Ok((meta, parent.parent_id, *parent.listing.directory_id()))
    }

    /// Fetch the metadata of the entry at `path`, plus the ids of its
    /// parent and grandparent directories.
    pub async fn get_meta_data(
        &self,
        path: &Path,
    ) -> Result<(MetaData, DirectoryId, DirectoryId), DriveError> {
        let _guard = self.api_lock.lock().await;
        self.get_meta_data_inner(path).await
    }

    /// Add a prepared entry under the parent of `path`. Returns the
    /// grandparent and parent directory ids.
    pub async fn add_file(
        &self,
        path: &Path,
        meta: MetaData,
    ) -> Result<(DirectoryId, DirectoryId), DriveError> {
        let _guard = self.api_lock.lock().await;
        self.handler.add_element(path, meta).await
    }

    /// Create an empty file and hand back an open handle on it.
    pub async fn create_file(&self, path: &Path) -> Result<FileContext<S>, DriveError> {
        let _guard = self.api_lock.lock().await;
        let (_, name) = split_path(path)?;
        let meta = MetaData::new_file(name);
        let (grandparent_id, parent_id) = self.handler.add_element(path, meta.clone()).await?;
        Ok(FileContext::new(
            meta,
            path.to_path_buf(),
            grandparent_id,
            parent_id,
            self.store.clone(),
        ))
    }

    /// Create an empty directory.
    pub async fn create_directory(&self, path: &Path) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        let (_, name) = split_path(path)?;
        self.handler
            .add_element(path, MetaData::new_directory(name))
            .await?;
        Ok(())
    }

    /// Open the file at `path`.
    pub async fn open(&self, path: &Path) -> Result<FileContext<S>, DriveError> {
        let _guard = self.api_lock.lock().await;
        let (meta, grandparent_id, parent_id) = self.get_meta_data_inner(path).await?;
        if meta.is_directory() {
            return Err(DriveError::invalid(format!("{path:?} is a directory")));
        }
        Ok(FileContext::new(
            meta,
            path.to_path_buf(),
            grandparent_id,
            parent_id,
            self.store.clone(),
        ))
    }

    /// Resize an open file.
    pub async fn truncate_file(
        &self,
        context: &mut FileContext<S>,
        size: u64,
    ) -> Result<(), DriveError> {
        context.truncate(size).await
    }

    /// Write an open handle's metadata back to its parent listing.
    pub async fn update_parent(&self, context: &FileContext<S>) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        self.handler
            .update_parent_directory_listing(context.parent_path(), context.meta.clone())
            .await
    }

    /// Close a handle. Pending content is flushed and, when anything
    /// changed, the metadata copy is written back to the parent.
    /// Failures are logged, never surfaced; closing twice is a no-op.
    pub async fn close(&self, context: &mut FileContext<S>) -> Result<(), DriveError> {
        if context.closed {
            return Ok(());
        }
        if context.content_changed {
            if let Err(err) = context.flush().await {
                error!("flush on close failed for {:?}: {err}", context.path());
            } else {
                let _guard = self.api_lock.lock().await;
                if let Err(err) = self
                    .handler
                    .update_parent_directory_listing(context.parent_path(), context.meta.clone())
                    .await
                {
                    error!(
                        "parent update on close failed for {:?}: {err}",
                        context.path()
                    );
                }
            }
        }
        context.encryptor = None;
        context.closed = true;
        Ok(())
    }

    /// Policy check consumed by the adapter before a delete.
    pub fn can_remove(&self, path: &Path) -> bool {
        self.handler.can_delete(path)
    }

    async fn remove_file_inner(&self, path: &Path) -> Result<(), DriveError> {
        let meta = self.handler.delete_element(path).await?;
        if let Some(data_map) = meta.data_map() {
            let mut encryptor = SelfEncryptor::new(data_map.clone(), self.store.clone());
            encryptor.delete_all_chunks().await?;
        }
        debug!("removed {:?}", path);
        Ok(())
    }

    /// Delete the entry at `path`. A file's chunks are reclaimed; a
    /// directory must have had its children removed first.
    pub async fn remove_file(&self, path: &Path) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        self.remove_file_inner(path).await
    }

    /// Rename or move an entry. Returns the allocated size of any
    /// displaced target.
    pub async fn rename_file(
        &self,
        old_path: &Path,
        new_path: &Path,
        meta: &mut MetaData,
    ) -> Result<u64, DriveError> {
        let _guard = self.api_lock.lock().await;
        let reclaimed = self.handler.rename_element(old_path, new_path, meta).await?;
        if let Some(observer) = &self.rename_observer {
            observer(old_path, new_path);
        }
        Ok(reclaimed)
    }

    /// Names of the visible children of the directory at `path`,
    /// optionally filtered by an enumeration mask.
    pub async fn list_directory(
        &self,
        path: &Path,
        mask: Option<&str>,
    ) -> Result<Vec<String>, DriveError> {
        let _guard = self.api_lock.lock().await;
        let directory = self.handler.get_from_path(path).await?;
        Ok(directory
            .listing
            .visible_children()
            .filter(|meta| mask.map_or(true, |mask| names::matches_mask(mask, &meta.name)))
            .map(|meta| meta.name.clone())
            .collect())
    }

    // ---- data map transfer ------------------------------------------

    async fn read_data_map_inner(&self, path: &Path) -> Result<Vec<u8>, DriveError> {
        let (meta, _, _) = self.get_meta_data_inner(path).await?;
        let data_map = meta
            .data_map()
            .ok_or_else(|| DriveError::invalid(format!("{path:?} is not a file")))?;
        Ok(serialize_data_map(data_map)?)
    }

    /// Serialize the DataMap of the file at `path`, e.g. to hand the
    /// file to another party without re-uploading its chunks.
    pub async fn get_data_map(&self, path: &Path) -> Result<Vec<u8>, DriveError> {
        let _guard = self.api_lock.lock().await;
        self.read_data_map_inner(path).await
    }

    /// Alias of [`Drive::get_data_map`] for hidden files.
    pub async fn get_data_map_hidden(&self, path: &Path) -> Result<Vec<u8>, DriveError> {
        let _guard = self.api_lock.lock().await;
        self.read_data_map_inner(path).await
    }

    /// Graft a file received as a serialized DataMap into the tree. The
    /// chunks are assumed to already be present in the store.
    pub async fn insert_data_map(
        &self,
        path: &Path,
        serialised_data_map: &[u8],
    ) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        let (_, name) = split_path(path)?;
        let data_map = parse_data_map(serialised_data_map)?;

        let mut meta = MetaData::new_file(name);
        let size = data_map.len();
        meta.set_data_map(data_map);
        meta.set_new_attributes(size);

        self.handler.add_element(path, meta).await?;
        Ok(())
    }

    // ---- hidden files -----------------------------------------------

    fn require_hidden(path: &Path) -> Result<(), DriveError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !names::is_hidden_name(&name) {
            return Err(DriveError::invalid(format!(
                "{path:?} does not carry the {} extension",
                names::HIDDEN_EXTENSION
            )));
        }
        Ok(())
    }

    /// Read the full content of a hidden file.
    pub async fn read_hidden_file(&self, path: &Path) -> Result<Vec<u8>, DriveError> {
        let _guard = self.api_lock.lock().await;
        Self::require_hidden(path)?;

        let (meta, _, _) = self.get_meta_data_inner(path).await?;
        let data_map = meta
            .data_map()
            .ok_or_else(|| DriveError::invalid(format!("{path:?} is not a file")))?
            .clone();
        let size = data_map.len();
        let mut encryptor = SelfEncryptor::new(data_map, self.store.clone());
        Ok(encryptor.read(0, size as usize).await?)
    }

    /// Create or overwrite a hidden file with `content`. Refuses to
    /// replace an existing file unless `overwrite_existing` is set.
    pub async fn write_hidden_file(
        &self,
        path: &Path,
        content: &[u8],
        overwrite_existing: bool,
    ) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        Self::require_hidden(path)?;
        let (_, name) = split_path(path)?;

        let mut context = match self.get_meta_data_inner(path).await {
            Ok((meta, grandparent_id, parent_id)) => {
                if !overwrite_existing {
                    return Err(DriveError::invalid(format!("{path:?} already exists")));
                }
                FileContext::new(
                    meta,
                    path.to_path_buf(),
                    grandparent_id,
                    parent_id,
                    self.store.clone(),
                )
            }
            Err(DriveError::NotFound(_)) => {
                let meta = MetaData::new_file(name);
                let (grandparent_id, parent_id) =
                    self.handler.add_element(path, meta.clone()).await?;
                FileContext::new(
                    meta,
                    path.to_path_buf(),
                    grandparent_id,
                    parent_id,
                    self.store.clone(),
                )
            }
            Err(err) => return Err(err),
        };

        context.truncate(content.len() as u64).await?;
        context.write(content, 0).await?;
        context.flush().await?;
        self.handler
            .update_parent_directory_listing(context.parent_path(), context.meta.clone())
            .await
    }

    /// Delete a hidden file, reclaiming its chunks.
    pub async fn delete_hidden_file(&self, path: &Path) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        Self::require_hidden(path)?;
        self.remove_file_inner(path).await
    }

    /// Names of the hidden files in the directory at `path`.
    pub async fn search_hidden_files(&self, path: &Path) -> Result<Vec<String>, DriveError> {
        let _guard = self.api_lock.lock().await;
        let directory = self.handler.get_from_path(path).await?;
        Ok(directory.listing.hidden_child_names())
    }

    // ---- notes ------------------------------------------------------

    /// The notes attached to the entry at `path`, in insertion order.
    pub async fn get_notes(&self, path: &Path) -> Result<Vec<Vec<u8>>, DriveError> {
        let _guard = self.api_lock.lock().await;
        let (meta, _, _) = self.get_meta_data_inner(path).await?;
        Ok(meta.notes)
    }

    /// Append an opaque note to the entry at `path`.
    pub async fn add_note(&self, path: &Path, note: Vec<u8>) -> Result<(), DriveError> {
        let _guard = self.api_lock.lock().await;
        let (parent_path, _) = split_path(path)?;
        let (mut meta, _, _) = self.get_meta_data_inner(path).await?;
        meta.notes.push(note);
        self.handler
            .update_parent_directory_listing(&parent_path, meta)
            .await
    }
}
