//! Durable storage for the persisted session.
//!
//! The session store reads storage once at startup, writes it on every
//! successful sign-in or refresh and clears it on sign-out. Backends:
//!
//! - `FileStorage`: `session.json` in the cache directory
//! - `SealedFileStorage`: `session.sealed`, XChaCha20-Poly1305 encrypted,
//!   key held in the OS keychain
//! - `KeyringStorage`: the whole session in an OS keychain entry
//! - `MemoryStorage`: process lifetime only

pub mod file;
pub mod keychain;
pub mod memory;
pub mod sealed;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::PersistedSession;

pub use file::FileStorage;
pub use keychain::KeyringStorage;
pub use memory::MemoryStorage;
pub use sealed::{SealKey, SealedFileStorage};

/// Service name used for OS keychain entries
pub const KEYRING_SERVICE: &str = "sautii";

pub trait SessionStorage: Send + Sync {
    /// Returns `Ok(None)` when nothing has been persisted.
    fn load(&self) -> Result<Option<PersistedSession>>;

    fn save(&self, session: &PersistedSession) -> Result<()>;

    /// Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    #[default]
    Sealed,
    Keyring,
    Memory,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::File => "file",
            StorageBackend::Sealed => "sealed",
            StorageBackend::Keyring => "keyring",
            StorageBackend::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "sealed" => Ok(StorageBackend::Sealed),
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!(
                "Unknown storage backend '{}' (expected file, sealed, keyring or memory)",
                other
            )),
        }
    }
}

/// Open the configured backend rooted at `cache_dir`.
pub fn open(backend: StorageBackend, cache_dir: &Path) -> Result<Arc<dyn SessionStorage>> {
    let storage: Arc<dyn SessionStorage> = match backend {
        StorageBackend::File => Arc::new(FileStorage::new(cache_dir.to_path_buf())),
        StorageBackend::Sealed => {
            let key = SealKey::load_or_create(KEYRING_SERVICE)?;
            Arc::new(SealedFileStorage::new(cache_dir.to_path_buf(), key))
        }
        StorageBackend::Keyring => Arc::new(KeyringStorage::new(KEYRING_SERVICE)),
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
    };
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("file".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!(" Sealed ".parse::<StorageBackend>().unwrap(), StorageBackend::Sealed);
        assert_eq!("KEYRING".parse::<StorageBackend>().unwrap(), StorageBackend::Keyring);
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_backend_display_round_trips() {
        for backend in [
            StorageBackend::File,
            StorageBackend::Sealed,
            StorageBackend::Keyring,
            StorageBackend::Memory,
        ] {
            assert_eq!(backend.to_string().parse::<StorageBackend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_open_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(StorageBackend::File, dir.path()).unwrap();
        assert!(storage.load().unwrap().is_none());
    }
}
