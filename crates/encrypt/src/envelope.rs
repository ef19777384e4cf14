//! AEAD envelope for directory DataMaps.
//!
//! A directory's DataMap is sealed under a key derived from the pair
//! `(parent_id, directory_id)`, with both ids bound in as associated
//! data. Decrypting therefore proves the caller knows the directory's
//! place in the tree, not just its blob key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use stowage_store::Identity;

use crate::data_map::{parse_data_map, serialize_data_map, DataMap};
use crate::EncryptError;

const ENVELOPE_KEY_CONTEXT: &str = "stowage-encrypt 2024-06 directory envelope key";
const NONCE_SIZE: usize = 12;

fn envelope_key(parent_id: &Identity, directory_id: &Identity) -> Key {
    let mut hasher = blake3::Hasher::new_derive_key(ENVELOPE_KEY_CONTEXT);
    hasher.update(parent_id.as_bytes());
    hasher.update(directory_id.as_bytes());
    let derived: [u8; 32] = *hasher.finalize().as_bytes();
    *Key::from_slice(&derived)
}

fn associated_data(parent_id: &Identity, directory_id: &Identity) -> Vec<u8> {
    let mut aad = Vec::with_capacity(128);
    aad.extend_from_slice(parent_id.as_bytes());
    aad.extend_from_slice(directory_id.as_bytes());
    aad
}

/// Seal a directory's DataMap. Output is `nonce || ciphertext`.
pub fn encrypt_data_map(
    parent_id: &Identity,
    directory_id: &Identity,
    data_map: &DataMap,
) -> Result<Vec<u8>, EncryptError> {
    let plaintext = serialize_data_map(data_map)?;
    let cipher = ChaCha20Poly1305::new(&envelope_key(parent_id, directory_id));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes).map_err(|_| EncryptError::Crypto)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = associated_data(parent_id, directory_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: &plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| EncryptError::Crypto)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed DataMap. Fails if the envelope was produced under a
/// different `(parent_id, directory_id)` pair or was tampered with.
pub fn decrypt_data_map(
    parent_id: &Identity,
    directory_id: &Identity,
    envelope: &[u8],
) -> Result<DataMap, EncryptError> {
    if envelope.len() < NONCE_SIZE {
        return Err(EncryptError::Crypto);
    }
    let cipher = ChaCha20Poly1305::new(&envelope_key(parent_id, directory_id));
    let nonce = Nonce::from_slice(&envelope[..NONCE_SIZE]);

    let aad = associated_data(parent_id, directory_id);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &envelope[NONCE_SIZE..],
                aad: &aad,
            },
        )
        .map_err(|_| EncryptError::Crypto)?;

    parse_data_map(&plaintext)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let parent = Identity::generate();
        let dir = Identity::generate();
        let map = DataMap::from_parts(Vec::new(), b"listing bytes".to_vec());

        let sealed = encrypt_data_map(&parent, &dir, &map).unwrap();
        let opened = decrypt_data_map(&parent, &dir, &sealed).unwrap();
        assert_eq!(map, opened);
    }

    #[test]
    fn test_wrong_lineage_fails() {
        let parent = Identity::generate();
        let dir = Identity::generate();
        let map = DataMap::new();

        let sealed = encrypt_data_map(&parent, &dir, &map).unwrap();

        let other = Identity::generate();
        assert!(decrypt_data_map(&other, &dir, &sealed).is_err());
        assert!(decrypt_data_map(&parent, &other, &sealed).is_err());
    }

    #[test]
    fn test_tampered_envelope_fails() {
        let parent = Identity::generate();
        let dir = Identity::generate();
        let map = DataMap::from_parts(Vec::new(), vec![1, 2, 3]);

        let mut sealed = encrypt_data_map(&parent, &dir, &map).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(decrypt_data_map(&parent, &dir, &sealed).is_err());

        assert!(decrypt_data_map(&parent, &dir, &[0u8; 4]).is_err());
    }
}
