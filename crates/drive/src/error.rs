use stowage_encrypt::EncryptError;
use stowage_store::StoreError;

/// Failure taxonomy of the drive core.
///
/// Mount adapters translate these onto OS error codes (`NotFound` →
/// ENOENT, `PermissionDenied` → EACCES, `Parsing` → EIO, and so on).
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse failure: {0}")]
    Parsing(String),
    #[error("decryption failure")]
    Decryption,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("store error: {0}")]
    Io(StoreError),
    #[error("stale file handle")]
    StaleHandle,
}

impl DriveError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DriveError::InvalidParameter(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        DriveError::NotFound(msg.into())
    }
}

impl From<StoreError> for DriveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing => DriveError::NotFound("blob absent from store".into()),
            other => DriveError::Io(other),
        }
    }
}

impl From<EncryptError> for DriveError {
    fn from(err: EncryptError) -> Self {
        match err {
            EncryptError::Store(inner) => inner.into(),
            EncryptError::Crypto => DriveError::Decryption,
            EncryptError::Codec(inner) => DriveError::Parsing(inner.to_string()),
        }
    }
}

impl From<bincode::Error> for DriveError {
    fn from(err: bincode::Error) -> Self {
        DriveError::Parsing(err.to_string())
    }
}
