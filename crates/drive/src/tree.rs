use std::path::{Component, Path};
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use stowage_encrypt::SelfEncryptor;
use stowage_store::Store;
use tracing::{debug, error};

use crate::blob;
use crate::error::DriveError;
use crate::listing::{DirectoryData, DirectoryListing};
use crate::meta::{DirectoryId, MetaData};
use crate::names;
use crate::session::{self, Credentials, Session};

/// Name of the single root slot under the root-parent.
pub const ROOT_NAME: &str = "/";

/// Break a relative path into its component names. The leading root
/// separator becomes the distinguished `"/"` component naming the root
/// slot; an empty path addresses the root-parent itself.
fn split_components(path: &Path) -> Result<Vec<String>, DriveError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::RootDir => parts.push(ROOT_NAME.to_string()),
            Component::CurDir => {}
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            other => {
                return Err(DriveError::invalid(format!(
                    "unsupported path component {other:?}"
                )))
            }
        }
    }
    Ok(parts)
}

fn file_name(components: &[String]) -> Result<&String, DriveError> {
    components
        .last()
        .ok_or_else(|| DriveError::invalid("empty path"))
}

/// The directory tree manager.
///
/// Owns the two identities pinning the tree and the session signing key,
/// and drives every structural mutation of the namespace. All state
/// lives in the store; the handler itself is immutable after bootstrap.
pub struct DirectoryHandler<S: Store> {
    store: Arc<S>,
    session: Session,
    signing_key: SigningKey,
}

impl<S: Store> DirectoryHandler<S> {
    /// Bootstrap against the store: recover the session reachable from
    /// `credentials`, or mint a fresh one and create the root-parent and
    /// root directories.
    pub async fn new(store: Arc<S>, credentials: &Credentials) -> Result<Self, DriveError> {
        let (session, first_run) = session::establish(store.as_ref(), credentials).await?;
        let signing_key = session.signing_key();
        let handler = Self {
            store,
            session,
            signing_key,
        };
        if first_run {
            handler.create_root().await?;
        }
        Ok(handler)
    }

    async fn create_root(&self) -> Result<(), DriveError> {
        let root_meta = MetaData::new_directory(ROOT_NAME);
        let root_id = *root_meta.directory_id().expect("fresh directory meta");

        let mut root_parent_listing = DirectoryListing::new(self.session.root_parent_id);
        root_parent_listing.add_child(root_meta)?;
        let root_parent = DirectoryData::new(self.session.unique_user_id, root_parent_listing);
        let root = DirectoryData::new(self.session.root_parent_id, DirectoryListing::new(root_id));

        blob::store_directory(&self.store, &self.signing_key, &root_parent).await?;
        blob::store_directory(&self.store, &self.signing_key, &root).await?;
        debug!("created root directories for new user");
        Ok(())
    }

    pub fn unique_user_id(&self) -> &DirectoryId {
        &self.session.unique_user_id
    }

    pub fn root_parent_id(&self) -> &DirectoryId {
        &self.session.root_parent_id
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    async fn load_by_components(
        &self,
        components: &[String],
    ) -> Result<DirectoryData, DriveError> {
        let mut directory = blob::load_directory(
            &self.store,
            &self.session.unique_user_id,
            &self.session.root_parent_id,
        )
        .await?;

        for name in components {
            let meta = directory.listing.get_child(name)?;
            let Some(child_id) = meta.directory_id() else {
                return Err(DriveError::invalid(format!("'{name}' is not a directory")));
            };
            let child_id = *child_id;
            let parent_id = *directory.listing.directory_id();
            directory = blob::load_directory(&self.store, &parent_id, &child_id).await?;
        }
        Ok(directory)
    }

    /// Walk `path` from the root-parent down and return the directory it
    /// names. The number of blob fetches equals the path depth.
    pub async fn get_from_path(&self, path: &Path) -> Result<DirectoryData, DriveError> {
        let components = split_components(path)?;
        self.load_by_components(&components).await
    }

    /// Load the parent and grandparent directories of `path`, plus the
    /// parent's own entry in the grandparent.
    async fn get_parent_and_grandparent(
        &self,
        path: &Path,
    ) -> Result<(DirectoryData, DirectoryData, MetaData), DriveError> {
        let components = split_components(path)?;
        if components.len() < 2 {
            return Err(DriveError::invalid(format!(
                "path {path:?} has no addressable parent"
            )));
        }
        let parent_components = &components[..components.len() - 1];
        let parent_name = parent_components.last().expect("len checked above");
        let grandparent_components = &parent_components[..parent_components.len() - 1];

        let grandparent = self.load_by_components(grandparent_components).await?;
        let parent_meta = grandparent.listing.get_child(parent_name)?.clone();
        let Some(parent_id) = parent_meta.directory_id() else {
            return Err(DriveError::invalid(format!(
                "'{parent_name}' is not a directory"
            )));
        };

        let parent = blob::load_directory(
            &self.store,
            grandparent.listing.directory_id(),
            parent_id,
        )
        .await?;
        Ok((grandparent, parent, parent_meta))
    }

    /// Persist a grandparent after a timestamp propagation. Grandparent
    /// updates are not load-bearing; failures are logged and swallowed.
    async fn persist_grandparent(&self, grandparent: &DirectoryData, parent_meta: MetaData) {
        let mut grandparent = grandparent.clone();
        if let Err(err) = grandparent.listing.update_child(parent_meta) {
            error!("non-critical: grandparent child update failed: {err}");
            return;
        }
        if let Err(err) = blob::store_directory(&self.store, &self.signing_key, &grandparent).await
        {
            error!("non-critical: grandparent persist failed: {err}");
        }
    }

    /// Re-load a grandparent by path and propagate `parent_meta` into
    /// it. Used after multi-directory mutations where a stale pre-call
    /// copy could clobber a sibling persist.
    async fn refresh_and_persist_grandparent(&self, parent_path: &Path, parent_meta: MetaData) {
        let components = match split_components(parent_path) {
            Ok(components) if !components.is_empty() => components,
            _ => return,
        };
        let grandparent_components = &components[..components.len() - 1];
        match self.load_by_components(grandparent_components).await {
            Ok(grandparent) => self.persist_grandparent(&grandparent, parent_meta).await,
            Err(err) => error!("non-critical: grandparent reload failed: {err}"),
        }
    }

    /// Append `meta` under the parent of `path`.
    ///
    /// A directory child has its (empty) node stored before the parent
    /// listing is persisted; failure to store the child rolls the
    /// in-memory insertion back. Returns the grandparent's and parent's
    /// directory ids.
    pub async fn add_element(
        &self,
        path: &Path,
        meta: MetaData,
    ) -> Result<(DirectoryId, DirectoryId), DriveError> {
        let components = split_components(path)?;
        let name = file_name(&components)?;
        if !self.can_add(path) {
            return Err(DriveError::PermissionDenied(format!(
                "cannot add at {path:?}"
            )));
        }
        if names::excluded_filename(name) {
            return Err(DriveError::invalid(format!("name '{name}' is reserved")));
        }
        if meta.name != *name {
            return Err(DriveError::invalid(format!(
                "metadata names '{}' but path names '{name}'",
                meta.name
            )));
        }

        let (grandparent, mut parent, mut parent_meta) =
            self.get_parent_and_grandparent(path).await?;
        parent.listing.add_child(meta.clone())?;

        if let Some(directory_id) = meta.directory_id() {
            let child = DirectoryData::new(
                *parent.listing.directory_id(),
                DirectoryListing::new(*directory_id),
            );
            if let Err(err) = blob::store_directory(&self.store, &self.signing_key, &child).await {
                parent.listing.remove_child(&meta.name).ok();
                return Err(err);
            }
        }

        parent_meta.update_last_write();
        parent_meta.change_time = parent_meta.last_write_time;
        if meta.is_directory() {
            parent_meta.nlink += 1;
        }

        if let Err(err) = blob::store_directory(&self.store, &self.signing_key, &parent).await {
            parent.listing.remove_child(&meta.name).ok();
            return Err(err);
        }
        self.persist_grandparent(&grandparent, parent_meta).await;

        Ok((
            *grandparent.listing.directory_id(),
            *parent.listing.directory_id(),
        ))
    }

    /// Remove the entry at `path` from its parent and return its
    /// metadata (so the caller can reclaim a file's chunks). A directory
    /// entry has its stored node deleted; cascading a subtree is the
    /// caller's responsibility via recursive deletes.
    pub async fn delete_element(&self, path: &Path) -> Result<MetaData, DriveError> {
        let components = split_components(path)?;
        let name = file_name(&components)?.clone();
        if !self.can_delete(path) {
            return Err(DriveError::PermissionDenied(format!(
                "cannot delete {path:?}"
            )));
        }

        let (grandparent, mut parent, mut parent_meta) =
            self.get_parent_and_grandparent(path).await?;
        let meta = parent.listing.get_child(&name)?.clone();

        if let Some(directory_id) = meta.directory_id() {
            blob::delete_directory(&self.store, parent.listing.directory_id(), directory_id)
                .await?;
        }

        parent.listing.remove_child(&name)?;
        parent_meta.update_last_write();
        parent_meta.change_time = parent_meta.last_write_time;
        if meta.is_directory() {
            parent_meta.nlink = parent_meta.nlink.saturating_sub(1);
        }

        blob::store_directory(&self.store, &self.signing_key, &parent).await?;
        self.persist_grandparent(&grandparent, parent_meta).await;

        Ok(meta)
    }

    /// Move `meta` from `old_path` to `new_path`, returning the
    /// allocated size of any displaced target.
    pub async fn rename_element(
        &self,
        old_path: &Path,
        new_path: &Path,
        meta: &mut MetaData,
    ) -> Result<u64, DriveError> {
        if old_path == new_path {
            return Ok(0);
        }
        let old_components = split_components(old_path)?;
        file_name(&old_components)?;
        let new_components = split_components(new_path)?;
        let new_name = file_name(&new_components)?.clone();
        if !self.can_rename(old_path, new_path) {
            return Err(DriveError::PermissionDenied(format!(
                "cannot rename {old_path:?} to {new_path:?}"
            )));
        }
        if names::excluded_filename(&new_name) {
            return Err(DriveError::invalid(format!(
                "name '{new_name}' is reserved"
            )));
        }

        let saved_times = (meta.change_time, meta.last_write_time);
        let result = if old_path.parent() == new_path.parent() {
            self.rename_same_parent(old_path, &new_name, meta).await
        } else {
            self.rename_different_parent(old_path, new_path, &new_name, meta)
                .await
        };
        if result.is_err() {
            meta.change_time = saved_times.0;
            meta.last_write_time = saved_times.1;
        }
        result
    }

    async fn rename_same_parent(
        &self,
        old_path: &Path,
        new_name: &str,
        meta: &mut MetaData,
    ) -> Result<u64, DriveError> {
        let (grandparent, mut parent, mut parent_meta) =
            self.get_parent_and_grandparent(old_path).await?;

        meta.update_last_write();
        meta.change_time = meta.last_write_time;

        let mut reclaimed = 0u64;
        let mut displaced: Option<MetaData> = None;

        // A target that is the source under another casing is not a
        // displacement, just a rename.
        let target = match parent.listing.get_child(new_name) {
            Ok(existing) if existing.name != meta.name => Some(existing.clone()),
            _ => None,
        };
        if let Some(target) = target {
            self.ensure_target_removable(&parent, &target).await?;
            parent.listing.remove_child(&target.name)?;
            reclaimed = target.allocated_size();
            displaced = Some(target);
        }

        parent.listing.remove_child(&meta.name)?;
        meta.name = new_name.to_string();
        parent.listing.add_child(meta.clone())?;

        parent_meta.last_write_time = meta.last_write_time;
        parent_meta.change_time = meta.last_write_time;

        blob::store_directory(&self.store, &self.signing_key, &parent).await?;
        if let Some(displaced) = displaced {
            self.reclaim_displaced(&parent, &displaced).await;
        }
        self.persist_grandparent(&grandparent, parent_meta).await;

        Ok(reclaimed)
    }

    async fn rename_different_parent(
        &self,
        old_path: &Path,
        new_path: &Path,
        new_name: &str,
        meta: &mut MetaData,
    ) -> Result<u64, DriveError> {
        let (_, mut old_parent, mut old_parent_meta) =
            self.get_parent_and_grandparent(old_path).await?;
        let (_, mut new_parent, mut new_parent_meta) =
            self.get_parent_and_grandparent(new_path).await?;

        meta.update_last_write();
        meta.change_time = meta.last_write_time;

        // A moved directory keeps its id but its stored node is sealed
        // under its lineage; re-store it under the new parent before the
        // listings change.
        if meta.is_directory() {
            let directory = self.get_from_path(old_path).await?;
            blob::delete_directory(
                &self.store,
                &directory.parent_id,
                directory.listing.directory_id(),
            )
            .await?;
            let reparented =
                DirectoryData::new(*new_parent.listing.directory_id(), directory.listing);
            blob::store_directory(&self.store, &self.signing_key, &reparented).await?;
        }

        old_parent.listing.remove_child(&meta.name)?;

        let mut reclaimed = 0u64;
        let mut displaced: Option<MetaData> = None;
        if let Ok(target) = new_parent.listing.get_child(new_name) {
            let target = target.clone();
            self.ensure_target_removable(&new_parent, &target).await?;
            new_parent.listing.remove_child(&target.name)?;
            reclaimed = target.allocated_size();
            displaced = Some(target);
        }

        meta.name = new_name.to_string();
        new_parent.listing.add_child(meta.clone())?;

        old_parent_meta.last_write_time = meta.last_write_time;
        old_parent_meta.change_time = meta.last_write_time;
        if meta.is_directory() {
            old_parent_meta.nlink = old_parent_meta.nlink.saturating_sub(1);
            new_parent_meta.nlink += 1;
            new_parent_meta.last_write_time = meta.last_write_time;
            new_parent_meta.change_time = meta.last_write_time;
        }

        blob::store_directory(&self.store, &self.signing_key, &old_parent).await?;
        blob::store_directory(&self.store, &self.signing_key, &new_parent).await?;
        if let Some(displaced) = displaced {
            self.reclaim_displaced(&new_parent, &displaced).await;
        }

        // Grandparents are refreshed from the store before propagation:
        // either parent may itself be the other's grandparent, and a
        // stale pre-call copy would undo the persists above.
        let old_parent_path = old_path.parent().unwrap_or_else(|| Path::new(""));
        let new_parent_path = new_path.parent().unwrap_or_else(|| Path::new(""));
        self.refresh_and_persist_grandparent(old_parent_path, old_parent_meta)
            .await;
        self.refresh_and_persist_grandparent(new_parent_path, new_parent_meta)
            .await;

        Ok(reclaimed)
    }

    /// A rename may displace a file, or a directory with no children.
    async fn ensure_target_removable(
        &self,
        parent: &DirectoryData,
        target: &MetaData,
    ) -> Result<(), DriveError> {
        if let Some(directory_id) = target.directory_id() {
            let target_directory =
                blob::load_directory(&self.store, parent.listing.directory_id(), directory_id)
                    .await?;
            if !target_directory.listing.is_empty() {
                return Err(DriveError::invalid(format!(
                    "rename target '{}' is a non-empty directory",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Drop the stored bytes of a displaced rename target. The listings
    /// no longer reference it, so failures only leak blobs; log and move
    /// on.
    async fn reclaim_displaced(&self, parent: &DirectoryData, displaced: &MetaData) {
        match &displaced.content {
            crate::meta::Content::File { data_map } => {
                let mut encryptor = SelfEncryptor::new(data_map.clone(), self.store.clone());
                if let Err(err) = encryptor.delete_all_chunks().await {
                    error!("failed to reclaim displaced file chunks: {err}");
                }
            }
            crate::meta::Content::Directory { directory_id } => {
                if let Err(err) = blob::delete_directory(
                    &self.store,
                    parent.listing.directory_id(),
                    directory_id,
                )
                .await
                {
                    error!("failed to reclaim displaced directory: {err}");
                }
            }
        }
    }

    /// Replace the child entry named by `meta` in the directory at
    /// `parent_path` and persist the listing.
    pub async fn update_parent_directory_listing(
        &self,
        parent_path: &Path,
        meta: MetaData,
    ) -> Result<(), DriveError> {
        let mut parent = self.get_from_path(parent_path).await?;
        parent.listing.update_child(meta)?;
        blob::store_directory(&self.store, &self.signing_key, &parent).await
    }

    /// Everything strictly below the root slot is writeable; the
    /// root-parent and the root slot itself are not.
    pub fn can_add(&self, path: &Path) -> bool {
        split_components(path).map(|c| c.len() >= 2).unwrap_or(false)
    }

    pub fn can_delete(&self, path: &Path) -> bool {
        self.can_add(path)
    }

    pub fn can_rename(&self, old_path: &Path, new_path: &Path) -> bool {
        self.can_add(old_path) && self.can_add(new_path)
    }
}
