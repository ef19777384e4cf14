use std::sync::Arc;

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey};
use serde::{Deserialize, Serialize};
use stowage_encrypt::{decrypt_data_map, encrypt_data_map, DataMap, SelfEncryptor};
use stowage_store::Store;
use tracing::debug;

use crate::error::DriveError;
use crate::listing::{DirectoryData, DirectoryListing};
use crate::meta::DirectoryId;

/// The stored form of one directory node, keyed by its directory id.
///
/// `encrypted_data_map` is the sealed DataMap of the self-encrypted
/// listing; `signature` covers `name ‖ encrypted_data_map` under the
/// session signing key. The signature is written for auditability and is
/// not checked on load.
#[derive(Serialize, Deserialize)]
pub struct OwnerDirectory {
    pub name: DirectoryId,
    pub encrypted_data_map: Vec<u8>,
    pub signature: Vec<u8>,
}

impl OwnerDirectory {
    /// Check the envelope signature against a verifying key, for readers
    /// that hold one.
    pub fn verify(&self, key: &ed25519_dalek::VerifyingKey) -> bool {
        let Ok(signature) = <[u8; 64]>::try_from(self.signature.as_slice()) else {
            return false;
        };
        let mut message = Vec::with_capacity(64 + self.encrypted_data_map.len());
        message.extend_from_slice(self.name.as_bytes());
        message.extend_from_slice(&self.encrypted_data_map);
        key.verify_strict(&message, &Signature::from_bytes(&signature))
            .is_ok()
    }
}

/// Fetch and unseal the DataMap of a stored directory.
async fn retrieve_data_map<S: Store>(
    store: &Arc<S>,
    parent_id: &DirectoryId,
    directory_id: &DirectoryId,
) -> Result<DataMap, DriveError> {
    let bytes = store.get(directory_id).await?;
    let envelope: OwnerDirectory = bincode::deserialize(&bytes)?;
    if envelope.name != *directory_id {
        return Err(DriveError::Parsing("directory envelope name mismatch".into()));
    }
    Ok(decrypt_data_map(
        parent_id,
        directory_id,
        &envelope.encrypted_data_map,
    )?)
}

/// Serialize, self-encrypt, seal and sign a directory, storing the
/// envelope under the directory's id.
///
/// Chunks left behind by the directory's previous serialization are
/// dropped once the new envelope is in place.
pub async fn store_directory<S: Store>(
    store: &Arc<S>,
    signing_key: &SigningKey,
    directory: &DirectoryData,
) -> Result<(), DriveError> {
    let directory_id = *directory.listing.directory_id();
    debug!(
        "storing directory {:?} under parent {:?}",
        directory_id, directory.parent_id
    );

    // The previous generation's chunk set, if this node was stored
    // before under the same lineage.
    let previous = retrieve_data_map(store, &directory.parent_id, &directory_id)
        .await
        .ok();

    let serialised = directory.listing.serialize()?;
    let mut encryptor = SelfEncryptor::new(DataMap::new(), store.clone());
    encryptor.write(&serialised, 0).await?;
    encryptor.flush().await?;
    let data_map = encryptor.data_map().clone();

    let encrypted_data_map = encrypt_data_map(&directory.parent_id, &directory_id, &data_map)?;

    let mut message = Vec::with_capacity(64 + encrypted_data_map.len());
    message.extend_from_slice(directory_id.as_bytes());
    message.extend_from_slice(&encrypted_data_map);
    let signature = signing_key.sign(&message).to_bytes().to_vec();

    let envelope = OwnerDirectory {
        name: directory_id,
        encrypted_data_map,
        signature,
    };
    store
        .put(directory_id, Bytes::from(bincode::serialize(&envelope)?))
        .await?;

    if let Some(previous) = previous {
        for old in previous.chunks() {
            if !data_map.chunks().iter().any(|c| c.id == old.id) {
                store.delete(&old.id).await?;
            }
        }
    }

    Ok(())
}

/// Load and parse the directory stored under `directory_id`.
///
/// Fails with `Parsing` when the recovered listing does not carry the
/// requested id: the stored parent/child relationship must agree with
/// the caller's view of the tree.
pub async fn load_directory<S: Store>(
    store: &Arc<S>,
    parent_id: &DirectoryId,
    directory_id: &DirectoryId,
) -> Result<DirectoryData, DriveError> {
    debug!(
        "loading directory {:?} under parent {:?}",
        directory_id, parent_id
    );
    let data_map = retrieve_data_map(store, parent_id, directory_id).await?;

    let size = data_map.len();
    let mut encryptor = SelfEncryptor::new(data_map, store.clone());
    let serialised = encryptor.read(0, size as usize).await?;

    let listing = DirectoryListing::parse(&serialised)?;
    if listing.directory_id() != directory_id {
        return Err(DriveError::Parsing(format!(
            "directory id mismatch: stored {:?}, requested {:?}",
            listing.directory_id(),
            directory_id
        )));
    }
    Ok(DirectoryData::new(*parent_id, listing))
}

/// Delete a stored directory: its listing chunks first, then the
/// envelope itself.
pub async fn delete_directory<S: Store>(
    store: &Arc<S>,
    parent_id: &DirectoryId,
    directory_id: &DirectoryId,
) -> Result<(), DriveError> {
    debug!("deleting directory {:?}", directory_id);
    let data_map = retrieve_data_map(store, parent_id, directory_id).await?;
    let mut encryptor = SelfEncryptor::new(data_map, store.clone());
    encryptor.delete_all_chunks().await?;
    store.delete(directory_id).await?;
    Ok(())
}
