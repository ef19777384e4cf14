use serde::{Deserialize, Serialize};

use crate::error::DriveError;
use crate::meta::{DirectoryId, MetaData};

fn sort_key(name: &str) -> (String, String) {
    (name.to_lowercase(), name.to_string())
}

/// The ordered child set of one directory node.
///
/// Children are kept sorted case-insensitively by name with ties broken
/// by code point, and names are unique under case-insensitive
/// comparison: `Readme` and `readme` collide. Hidden entries (reserved
/// extension) live in the same set but are skipped by ordinary
/// enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryListing {
    directory_id: DirectoryId,
    children: Vec<MetaData>,
}

impl DirectoryListing {
    pub fn new(directory_id: DirectoryId) -> Self {
        Self {
            directory_id,
            children: Vec::new(),
        }
    }

    pub fn directory_id(&self) -> &DirectoryId {
        &self.directory_id
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        let key = sort_key(name);
        self.children
            .binary_search_by(|child| sort_key(&child.name).cmp(&key))
    }

    /// Append a child. Fails with `InvalidParameter` when a child of the
    /// same case-insensitive name is already present.
    pub fn add_child(&mut self, meta: MetaData) -> Result<(), DriveError> {
        match self.position(&meta.name) {
            Ok(_) => Err(DriveError::invalid(format!(
                "child '{}' already exists",
                meta.name
            ))),
            Err(slot) => {
                self.children.insert(slot, meta);
                Ok(())
            }
        }
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    /// Look a child up by name (case-insensitive).
    pub fn get_child(&self, name: &str) -> Result<&MetaData, DriveError> {
        match self.position(name) {
            Ok(index) => Ok(&self.children[index]),
            Err(_) => Err(DriveError::not_found(format!("no child '{name}'"))),
        }
    }

    /// Remove and return the child of the given name.
    pub fn remove_child(&mut self, name: &str) -> Result<MetaData, DriveError> {
        match self.position(name) {
            Ok(index) => Ok(self.children.remove(index)),
            Err(_) => Err(DriveError::not_found(format!("no child '{name}'"))),
        }
    }

    /// Replace the child matching `meta.name` with `meta`.
    pub fn update_child(&mut self, meta: MetaData) -> Result<(), DriveError> {
        match self.position(&meta.name) {
            Ok(index) => {
                self.children[index] = meta;
                Ok(())
            }
            Err(_) => Err(DriveError::not_found(format!("no child '{}'", meta.name))),
        }
    }

    /// All children in listing order, hidden included.
    pub fn children(&self) -> impl Iterator<Item = &MetaData> {
        self.children.iter()
    }

    /// Children visible to ordinary enumeration.
    pub fn visible_children(&self) -> impl Iterator<Item = &MetaData> {
        self.children.iter().filter(|meta| !meta.is_hidden())
    }

    /// The `index`-th visible child, counting from zero. Enumeration
    /// cursors restart by re-reading from an index.
    pub fn visible_child_at(&self, index: usize) -> Option<&MetaData> {
        self.visible_children().nth(index)
    }

    /// Names of the hidden children.
    pub fn hidden_child_names(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|meta| meta.is_hidden())
            .map(|meta| meta.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Serialize to the wire form used inside the directory blob.
    pub fn serialize(&self) -> Result<Vec<u8>, DriveError> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse a listing from its wire form, re-establishing the sort
    /// order and rejecting listings with case-colliding names.
    pub fn parse(bytes: &[u8]) -> Result<Self, DriveError> {
        let mut listing: DirectoryListing = bincode::deserialize(bytes)?;
        listing
            .children
            .sort_by(|a, b| sort_key(&a.name).cmp(&sort_key(&b.name)));
        for pair in listing.children.windows(2) {
            if pair[0].name.to_lowercase() == pair[1].name.to_lowercase() {
                return Err(DriveError::Parsing(format!(
                    "duplicate child name '{}'",
                    pair[1].name
                )));
            }
        }
        Ok(listing)
    }
}

/// In-memory pairing of a listing with the id of its enclosing
/// directory. For the root directory `parent_id` is the root-parent id;
/// for the root-parent it is the unique user id.
#[derive(Debug, Clone)]
pub struct DirectoryData {
    pub parent_id: DirectoryId,
    pub listing: DirectoryListing,
}

impl DirectoryData {
    pub fn new(parent_id: DirectoryId, listing: DirectoryListing) -> Self {
        Self { parent_id, listing }
    }
}
