use bytes::Bytes;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use stowage_store::{Identity, Store, StoreError, IDENTITY_SIZE};
use tracing::debug;

use crate::error::DriveError;

const MID_NAME_CONTEXT: &str = "stowage 2024-06 mid name";
const TMID_NAME_CONTEXT: &str = "stowage 2024-06 tmid name";
const TMID_POINTER_KEY_CONTEXT: &str = "stowage 2024-06 tmid pointer key";
const SESSION_KEY_CONTEXT: &str = "stowage 2024-06 session key";

const NONCE_SIZE: usize = 12;

/// The three user secrets the drive is bootstrapped from. All are
/// treated as opaque high-entropy byte strings.
#[derive(Clone)]
pub struct Credentials {
    pub keyword: String,
    pub pin: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        keyword: impl Into<String>,
        pin: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            pin: pin.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<(), DriveError> {
        if self.keyword.is_empty() || self.pin.is_empty() || self.password.is_empty() {
            return Err(DriveError::invalid("empty credential field"));
        }
        Ok(())
    }
}

/// Length-prefixed KDF over credential fields. Each derivation uses its
/// own context string, so no two outputs are related.
fn derive(context: &str, parts: &[&[u8]]) -> blake3::Hasher {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher
}

fn derive_identity(context: &str, parts: &[&[u8]]) -> Identity {
    let mut out = [0u8; IDENTITY_SIZE];
    derive(context, parts).finalize_xof().fill(&mut out);
    out.into()
}

fn derive_key(context: &str, parts: &[&[u8]]) -> Key {
    let digest: [u8; 32] = *derive(context, parts).finalize().as_bytes();
    *Key::from_slice(&digest)
}

/// Deterministic store name of the MID indirection record.
pub fn mid_name(keyword: &str, pin: &str) -> Identity {
    derive_identity(MID_NAME_CONTEXT, &[keyword.as_bytes(), pin.as_bytes()])
}

/// Deterministic store name of the TMID envelope.
pub fn tmid_name(keyword: &str, pin: &str, password: &str) -> Identity {
    derive_identity(
        TMID_NAME_CONTEXT,
        &[keyword.as_bytes(), pin.as_bytes(), password.as_bytes()],
    )
}

fn seal(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>, DriveError> {
    let cipher = ChaCha20Poly1305::new(key);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes).map_err(|_| DriveError::Decryption)?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| DriveError::Decryption)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(key: &Key, sealed: &[u8]) -> Result<Vec<u8>, DriveError> {
    if sealed.len() < NONCE_SIZE {
        return Err(DriveError::Decryption);
    }
    let cipher = ChaCha20Poly1305::new(key);
    let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
    cipher
        .decrypt(nonce, &sealed[NONCE_SIZE..])
        .map_err(|_| DriveError::Decryption)
}

/// Per-user persisted state: the two identities pinning the tree and
/// the Ed25519 seed of the key that signs directory envelopes.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub unique_user_id: Identity,
    pub root_parent_id: Identity,
    signing_key_seed: [u8; 32],
}

impl Session {
    /// Fresh identities and a fresh signing key, for a first run.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("failed to generate random bytes");
        Self {
            unique_user_id: Identity::generate(),
            root_parent_id: Identity::generate(),
            signing_key_seed: seed,
        }
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signing_key_seed)
    }
}

/// Pointer from the credential-derived MID name to the TMID envelope.
#[derive(Serialize, Deserialize)]
struct Mid {
    name: Identity,
    encrypted_tmid_name: Vec<u8>,
}

/// Envelope holding the encrypted session record.
#[derive(Serialize, Deserialize)]
struct Tmid {
    name: Identity,
    encrypted_session: Vec<u8>,
}

/// Bootstrap a session against the store.
///
/// Probes the MID name: a miss means first run (a fresh session is
/// minted and both indirection records are persisted, TMID before MID);
/// a hit means recovery (both envelopes are opened with
/// credential-derived keys). The second tuple element reports which path
/// ran, so the caller knows whether the root directories still need to
/// be created.
pub async fn establish<S: Store>(
    store: &S,
    credentials: &Credentials,
) -> Result<(Session, bool), DriveError> {
    credentials.validate()?;
    let keyword = credentials.keyword.as_str();
    let pin = credentials.pin.as_str();
    let password = credentials.password.as_str();

    let mid = mid_name(keyword, pin);
    let pointer_key = derive_key(
        TMID_POINTER_KEY_CONTEXT,
        &[keyword.as_bytes(), pin.as_bytes()],
    );
    let session_key = derive_key(
        SESSION_KEY_CONTEXT,
        &[keyword.as_bytes(), pin.as_bytes(), password.as_bytes()],
    );

    let serialised_mid = match store.get(&mid).await {
        Ok(bytes) => Some(bytes),
        Err(StoreError::Missing) => None,
        Err(err) => return Err(err.into()),
    };

    match serialised_mid {
        None => {
            debug!("mid {:?} absent, creating fresh session", mid);
            let session = Session::generate();

            let tmid_name = tmid_name(keyword, pin, password);
            let encrypted_session = seal(&session_key, &bincode::serialize(&session)?)?;
            let tmid = Tmid {
                name: tmid_name,
                encrypted_session,
            };
            store
                .put(tmid.name, Bytes::from(bincode::serialize(&tmid)?))
                .await?;

            let mid_record = Mid {
                name: mid,
                encrypted_tmid_name: seal(&pointer_key, tmid_name.as_bytes())?,
            };
            store
                .put(mid, Bytes::from(bincode::serialize(&mid_record)?))
                .await?;

            Ok((session, true))
        }
        Some(bytes) => {
            debug!("mid {:?} present, recovering session", mid);
            let mid_record: Mid = bincode::deserialize(&bytes)?;
            if mid_record.name != mid {
                return Err(DriveError::Parsing("mid name mismatch".into()));
            }

            let tmid_name_bytes = open(&pointer_key, &mid_record.encrypted_tmid_name)?;
            let tmid_name = Identity::try_from(tmid_name_bytes.as_slice())
                .map_err(|err| DriveError::Parsing(err.to_string()))?;

            let serialised_tmid = store.get(&tmid_name).await?;
            let tmid: Tmid = bincode::deserialize(&serialised_tmid)?;
            if tmid.name != tmid_name {
                return Err(DriveError::Parsing("tmid name mismatch".into()));
            }

            let session_bytes = open(&session_key, &tmid.encrypted_session)?;
            let session: Session = bincode::deserialize(&session_bytes)?;
            Ok((session, false))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ed25519_dalek::Signer;
    use stowage_store::MemoryStore;

    #[test]
    fn test_name_derivations_deterministic() {
        assert_eq!(mid_name("k", "1234"), mid_name("k", "1234"));
        assert_ne!(mid_name("k", "1234"), mid_name("k", "1235"));
        assert_ne!(
            tmid_name("k", "1234", "p"),
            tmid_name("k", "1234", "q")
        );
        // The two name spaces never collide for the same credentials.
        assert_ne!(mid_name("k", "1234"), tmid_name("k", "1234", "p"));
    }

    #[test]
    fn test_length_prefixing_separates_fields() {
        // ("ab", "c") and ("a", "bc") must not derive the same name.
        assert_ne!(mid_name("ab", "c"), mid_name("a", "bc"));
    }

    #[tokio::test]
    async fn test_first_run_then_recovery() {
        let store = MemoryStore::unbounded();
        let credentials = Credentials::new("keyword", "1234", "password");

        let (fresh, first_run) = establish(&store, &credentials).await.unwrap();
        assert!(first_run);

        let (recovered, first_run) = establish(&store, &credentials).await.unwrap();
        assert!(!first_run);
        assert_eq!(fresh.unique_user_id, recovered.unique_user_id);
        assert_eq!(fresh.root_parent_id, recovered.root_parent_id);

        // The recovered signing key signs identically.
        let message = b"probe";
        assert_eq!(
            fresh.signing_key().sign(message).to_bytes(),
            recovered.signing_key().sign(message).to_bytes()
        );
    }

    #[tokio::test]
    async fn test_wrong_password_fails_decryption() {
        let store = MemoryStore::unbounded();
        establish(&store, &Credentials::new("keyword", "1234", "password"))
            .await
            .unwrap();

        let result = establish(&store, &Credentials::new("keyword", "1234", "wrong")).await;
        assert!(matches!(result, Err(DriveError::Decryption)));
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected() {
        let store = MemoryStore::unbounded();
        let result = establish(&store, &Credentials::new("", "1234", "p")).await;
        assert!(matches!(result, Err(DriveError::InvalidParameter(_))));
    }
}
