use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Size of a blob key in bytes.
pub const IDENTITY_SIZE: usize = 64;

/// Errors that can occur constructing an [`Identity`].
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identity size, expected {IDENTITY_SIZE}, got {0}")]
    InvalidLength(usize),
}

/// A 64-byte opaque name.
///
/// Identities key every blob in the store: directory envelopes, the
/// credential indirection records and encrypted chunks. They carry no
/// structure of their own; whoever mints one decides what it addresses.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; IDENTITY_SIZE]);

impl Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, Visitor};

        struct IdentityVisitor;

        impl<'de> Visitor<'de> for IdentityVisitor {
            type Value = Identity;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte array or sequence of IDENTITY_SIZE")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Identity::try_from(v)
                    .map_err(|_| E::invalid_length(v.len(), &"expected 64 bytes"))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(IDENTITY_SIZE);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Identity::try_from(bytes.as_slice())
                    .map_err(|_| A::Error::invalid_length(bytes.len(), &"expected 64 bytes"))
            }
        }

        // Bytes first (bincode/CBOR), sequence as the fallback (JSON).
        deserializer.deserialize_byte_buf(IdentityVisitor)
    }
}

impl Deref for Identity {
    type Target = [u8; IDENTITY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; IDENTITY_SIZE]> for Identity {
    fn from(bytes: [u8; IDENTITY_SIZE]) -> Self {
        Identity(bytes)
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = IdentityError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != IDENTITY_SIZE {
            return Err(IdentityError::InvalidLength(bytes.len()));
        }
        let mut buff = [0; IDENTITY_SIZE];
        buff.copy_from_slice(bytes);
        Ok(buff.into())
    }
}

impl Identity {
    /// Draw a fresh random identity using a cryptographically secure RNG.
    pub fn generate() -> Self {
        let mut buff = [0; IDENTITY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Identity(buff)
    }

    /// Get a reference to the raw bytes.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_SIZE] {
        &self.0
    }

    /// Convert to a hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full hex is unreadable in logs; the first eight bytes identify
        // a blob well enough.
        write!(f, "Identity({}..)", hex::encode(&self.0[..8]))
    }
}
