//! Application configuration management.
//!
//! Configuration is stored at `~/.config/sautii/config.json`. Environment
//! variables override the file so a `.env` next to the binary is enough to
//! point at a Supabase project.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_NATIONAL_ID_LOOKUP;
use crate::storage::StorageBackend;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "sautii";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default bound on identity provider calls
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Environment overrides, first match wins
const URL_VARS: &[&str] = &["SAUTII_SUPABASE_URL", "EXPO_PUBLIC_SUPABASE_URL"];
const ANON_KEY_VARS: &[&str] = &["SAUTII_SUPABASE_ANON_KEY", "EXPO_PUBLIC_SUPABASE_ANON_KEY"];
const STORAGE_VAR: &str = "SAUTII_STORAGE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    /// PostgREST function mapping a national ID to the account email
    pub national_id_lookup: String,
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    pub last_login_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            national_id_lookup: DEFAULT_NATIONAL_ID_LOOKUP.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            last_login_id: None,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| var(*n).filter(|v| !v.is_empty()))
        };
        if let Some(url) = first(URL_VARS) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = first(ANON_KEY_VARS) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(storage) = var(STORAGE_VAR).filter(|v| !v.is_empty()) {
            self.storage = storage
                .parse()
                .with_context(|| format!("Invalid {}", STORAGE_VAR))?;
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Project URL and anon key, or an error naming what is missing.
    pub fn supabase(&self) -> Result<(&str, &str)> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Supabase URL not configured (set {})", URL_VARS[0]))?;
        let key = self.supabase_anon_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("Supabase anon key not configured (set {})", ANON_KEY_VARS[0])
        })?;
        Ok((url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage, StorageBackend::Sealed);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.national_id_lookup, "email_for_national_id");
        assert!(config.supabase().is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config {
            supabase_url: Some("https://abc.supabase.co".to_string()),
            last_login_id: Some("12345678".to_string()),
            storage: StorageBackend::File,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"storage": "keyring"}"#).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            supabase_url: Some("https://file.example".to_string()),
            ..Config::default()
        };
        config
            .apply_env(env(&[
                ("EXPO_PUBLIC_SUPABASE_URL", "https://expo.example"),
                ("SAUTII_SUPABASE_URL", "https://sautii.example"),
                ("EXPO_PUBLIC_SUPABASE_ANON_KEY", "anon"),
                ("SAUTII_STORAGE", "memory"),
            ]))
            .unwrap();

        assert_eq!(config.supabase().unwrap(), ("https://sautii.example", "anon"));
        assert_eq!(config.storage, StorageBackend::Memory);
    }

    #[test]
    fn test_invalid_storage_env() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("SAUTII_STORAGE", "floppy")])).is_err());
    }
}
