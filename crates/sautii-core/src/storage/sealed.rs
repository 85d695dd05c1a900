//! Encrypted session file.
//!
//! File layout:
//!
//! ```text
//! [nonce (24 bytes)][ciphertext + tag]
//! ```
//!
//! The plaintext is the session JSON. XChaCha20-Poly1305 with a random
//! nonce per write; the associated data binds the blob to its purpose so a
//! sealed blob from another context cannot be swapped in.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use keyring::Entry;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use super::SessionStorage;
use crate::auth::PersistedSession;

/// Sealed session file name in cache directory
const SEALED_FILE: &str = "session.sealed";

/// Keychain account holding the sealing key
const KEY_ACCOUNT: &str = "session-key";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

const ASSOCIATED_DATA: &[u8] = b"sautii:session:v1";

/// 256-bit sealing key, zeroized on drop.
#[derive(Clone)]
pub struct SealKey([u8; KEY_SIZE]);

impl SealKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Fetch the key from the OS keychain, creating it on first use.
    pub fn load_or_create(service: &str) -> Result<Self> {
        let entry = Entry::new(service, KEY_ACCOUNT).context("Failed to create keyring entry")?;
        match entry.get_secret() {
            Ok(mut stored) => {
                let key = <[u8; KEY_SIZE]>::try_from(stored.as_slice())
                    .map(Self)
                    .map_err(|_| anyhow::anyhow!("Stored session key has the wrong length"));
                stored.zeroize();
                key
            }
            Err(keyring::Error::NoEntry) => {
                let key = Self::generate();
                entry
                    .set_secret(&key.0)
                    .context("Failed to store session key in keychain")?;
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to retrieve session key from keychain"),
        }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl Drop for SealKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SealKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealKey").field("key", &"[REDACTED]").finish()
    }
}

pub struct SealedFileStorage {
    cache_dir: PathBuf,
    key: SealKey,
}

impl SealedFileStorage {
    pub fn new(cache_dir: PathBuf, key: SealKey) -> Self {
        Self { cache_dir, key }
    }

    fn sealed_path(&self) -> PathBuf {
        self.cache_dir.join(SEALED_FILE)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .key
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|e| anyhow::anyhow!("Failed to seal session: {}", e))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            anyhow::bail!(
                "Sealed session too short: {} bytes (minimum {})",
                sealed.len(),
                NONCE_SIZE + TAG_SIZE
            );
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.key
            .cipher()
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| anyhow::anyhow!("Failed to open sealed session: authentication error"))
    }
}

impl SessionStorage for SealedFileStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        let path = self.sealed_path();
        if !path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&path).context("Failed to read sealed session file")?;
        let mut plaintext = self.open(&sealed)?;
        let parsed: Result<PersistedSession> =
            serde_json::from_slice(&plaintext).context("Failed to parse sealed session");
        plaintext.zeroize();
        Ok(Some(parsed?))
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        let path = self.sealed_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut plaintext = serde_json::to_vec(session)?;
        let sealed = self.seal(&plaintext);
        plaintext.zeroize();
        std::fs::write(path, sealed?).context("Failed to write sealed session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.sealed_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove sealed session file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::tests::sample_session;

    #[test]
    fn test_sealed_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SealedFileStorage::new(dir.path().to_path_buf(), SealKey::generate());

        assert!(storage.load().unwrap().is_none());

        let session = sample_session();
        storage.save(&session).unwrap();
        assert_eq!(storage.load().unwrap(), Some(session));

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_does_not_contain_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SealedFileStorage::new(dir.path().to_path_buf(), SealKey::generate());
        storage.save(&sample_session()).unwrap();

        let raw = std::fs::read(dir.path().join(SEALED_FILE)).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(!text.contains("access-token"));
        assert!(!text.contains("jane@example.co.ke"));
    }

    #[test]
    fn test_tampered_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SealedFileStorage::new(dir.path().to_path_buf(), SealKey::generate());
        storage.save(&sample_session()).unwrap();

        let path = dir.path().join(SEALED_FILE);
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        std::fs::write(&path, raw).unwrap();

        assert!(storage.load().is_err());
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        SealedFileStorage::new(dir.path().to_path_buf(), SealKey::generate())
            .save(&sample_session())
            .unwrap();

        let other = SealedFileStorage::new(dir.path().to_path_buf(), SealKey::generate());
        assert!(other.load().is_err());
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SEALED_FILE), [0u8; 10]).unwrap();
        let storage = SealedFileStorage::new(dir.path().to_path_buf(), SealKey::generate());
        assert!(storage.load().is_err());
    }

    #[test]
    fn test_seal_key_debug_is_redacted() {
        let key = SealKey::from_bytes([7u8; KEY_SIZE]);
        assert!(format!("{:?}", key).contains("REDACTED"));
    }
}
