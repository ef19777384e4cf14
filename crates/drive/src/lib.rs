/**
 * Per-entry metadata: names, timestamps, size bookkeeping, attribute
 *  words, notes, and the file-or-directory payload.
 */
pub mod meta;
/**
 * Directory listings: the ordered child set of one directory node,
 *  plus the in-memory pairing of a listing with its parent id.
 */
pub mod listing;
/**
 * The directory-blob codec. Serializes a listing, self-encrypts it,
 *  seals the resulting DataMap under the directory's lineage and signs
 *  the stored envelope.
 */
pub mod blob;
/**
 * The directory tree manager: path walking, add / delete / rename /
 *  update, timestamp propagation and the root protection policy.
 */
pub mod tree;
/**
 * Credentialed bootstrap. Derives the MID / TMID indirection names
 *  from (keyword, pin, password), establishes a fresh root on first
 *  run and recovers the existing one on return.
 */
pub mod session;
/**
 * Open-file handles tying a metadata copy to an active encryptor.
 */
pub mod file;
/**
 * The drive facade consumed by mount adapters: file lifecycle, hidden
 *  files, notes, data-map transfer and mount-state waiting.
 */
pub mod drive;
/**
 * Filename policy: reserved device names, excluded characters and
 *  wildcard mask matching.
 */
pub mod names;

mod error;

pub use error::DriveError;

pub mod prelude {
    pub use crate::drive::{Drive, DriveConfig};
    pub use crate::error::DriveError;
    pub use crate::file::FileContext;
    pub use crate::meta::MetaData;
    pub use crate::session::Credentials;
    pub use stowage_encrypt::DataMap;
    pub use stowage_store::{FsStore, Identity, MemoryStore, Store};
}
