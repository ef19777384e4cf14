use serde::{Deserialize, Serialize};
use stowage_encrypt::DataMap;
use stowage_store::Identity;
use time::OffsetDateTime;

use crate::names;

/// Synthetic on-disk size reported for directories.
pub const DIRECTORY_SIZE: u64 = 4096;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Identifier of one directory node. Doubles as the store key of the
/// directory's envelope blob.
pub type DirectoryId = Identity;

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// What a directory entry points at: the recipe for a file's bytes, or
/// the identifier of a child directory node. An entry is always exactly
/// one of the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    File { data_map: DataMap },
    Directory { directory_id: DirectoryId },
}

/// One directory entry: a file's or directory's name, timestamps, size
/// bookkeeping, POSIX attribute words, user notes and payload.
///
/// `name` is a single path component, never a full path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub name: String,

    /// Unix seconds.
    pub creation_time: i64,
    pub last_access_time: i64,
    pub last_write_time: i64,
    pub change_time: i64,

    pub end_of_file: u64,
    pub allocation_size: u64,

    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub blksize: u32,
    pub blocks: u64,

    pub content: Content,
    /// Symbolic-link target; stored, never resolved by the core.
    pub link_to: Option<String>,
    /// Opaque user-attached annotations, in insertion order.
    pub notes: Vec<Vec<u8>>,
}

impl MetaData {
    /// A fresh file entry with an empty DataMap.
    pub fn new_file(name: impl Into<String>) -> Self {
        Self::new(name.into(), Content::File {
            data_map: DataMap::new(),
        })
    }

    /// A fresh directory entry with a newly drawn directory id.
    pub fn new_directory(name: impl Into<String>) -> Self {
        let mut meta = Self::new(name.into(), Content::Directory {
            directory_id: Identity::generate(),
        });
        meta.mode = 0o755 | S_IFDIR;
        meta.end_of_file = DIRECTORY_SIZE;
        meta.allocation_size = DIRECTORY_SIZE;
        meta
    }

    fn new(name: String, content: Content) -> Self {
        let now = unix_now();
        Self {
            name,
            creation_time: now,
            last_access_time: now,
            last_write_time: now,
            change_time: now,
            end_of_file: 0,
            allocation_size: 0,
            mode: 0o644 | S_IFREG,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 4096,
            blocks: 0,
            content,
            link_to: None,
            notes: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.content, Content::Directory { .. })
    }

    pub fn directory_id(&self) -> Option<&DirectoryId> {
        match &self.content {
            Content::Directory { directory_id } => Some(directory_id),
            Content::File { .. } => None,
        }
    }

    pub fn data_map(&self) -> Option<&DataMap> {
        match &self.content {
            Content::File { data_map } => Some(data_map),
            Content::Directory { .. } => None,
        }
    }

    /// Replace a file entry's DataMap. No-op for directories.
    pub fn set_data_map(&mut self, map: DataMap) {
        if let Content::File { data_map } = &mut self.content {
            *data_map = map;
        }
    }

    /// Space the entry accounts for when displaced by a rename.
    pub fn allocated_size(&self) -> u64 {
        if self.is_directory() {
            DIRECTORY_SIZE
        } else {
            self.allocation_size
        }
    }

    /// True when the entry is hidden from ordinary enumeration.
    pub fn is_hidden(&self) -> bool {
        names::is_hidden_name(&self.name)
    }

    /// Bump the write clock to now.
    pub fn update_last_write(&mut self) {
        self.last_write_time = unix_now();
    }

    /// Stamp all clocks to now and refresh the size bookkeeping from
    /// `size`. Used when an entry (re)enters a listing with new content.
    pub fn set_new_attributes(&mut self, size: u64) {
        let now = unix_now();
        self.creation_time = now;
        self.last_access_time = now;
        self.last_write_time = now;
        self.change_time = now;
        self.end_of_file = size;
        self.allocation_size = size;
        self.blocks = size.div_ceil(512);
    }
}
