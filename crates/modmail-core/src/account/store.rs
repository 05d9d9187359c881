//! Durable account settings.
//!
//! Settings live in a single JSON file keyed by account address. Writes go
//! to a sibling temporary file first and are renamed into place, so a crash
//! never leaves a truncated file behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::ConnectionSettings;

/// Directory name under the platform config directory.
const APP_DIR: &str = "modern-mail";

/// File name of the settings file.
const CONFIG_FILE: &str = "config.json";

/// Error type for the settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File that was being accessed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The file exists but is not valid.
    #[error("Malformed config file {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The platform has no per-user config directory.
    #[error("No configuration directory available")]
    NoConfigDir,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    accounts: BTreeMap<String, ConnectionSettings>,
}

/// Reads and writes the account settings file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Returns the per-user settings path.
    ///
    /// # Errors
    ///
    /// Returns `NoConfigDir` when the platform has no config directory.
    pub fn default_location() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Creates a store backed by the given file.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all account settings. A missing file is an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn load(&self) -> Result<BTreeMap<String, ConnectionSettings>, ConfigError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file yet");
                return Ok(BTreeMap::new());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: ConfigFile =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(file.accounts)
    }

    /// Replaces the file contents with the given mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if any filesystem step fails.
    pub fn save(&self, accounts: &BTreeMap<String, ConnectionSettings>) -> Result<(), ConfigError> {
        let file = ConfigFileRef { accounts };
        let json = serde_json::to_string_pretty(&file).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        self.write_atomic(json.as_bytes())
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), count = accounts.len(), "Saved config");
        Ok(())
    }

    /// Inserts or overwrites one account, returning the previous settings.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub fn add_or_update(
        &self,
        address: &str,
        settings: ConnectionSettings,
    ) -> Result<Option<ConnectionSettings>, ConfigError> {
        let mut accounts = self.load()?;
        let previous = accounts.insert(address.to_string(), settings);
        self.save(&accounts)?;
        Ok(previous)
    }

    /// Removes one account, returning its settings if it existed.
    ///
    /// The file is left untouched when the address is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub fn remove(&self, address: &str) -> Result<Option<ConnectionSettings>, ConfigError> {
        let mut accounts = self.load()?;
        let previous = accounts.remove(address);
        if previous.is_some() {
            self.save(&accounts)?;
        }
        Ok(previous)
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| CONFIG_FILE.into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let result = (|| {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(contents)?;
            file.flush()?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

#[derive(Serialize)]
struct ConfigFileRef<'a> {
    accounts: &'a BTreeMap<String, ConnectionSettings>,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn settings(n: u16) -> ConnectionSettings {
        ConnectionSettings::new("smtp.example.com", 587, "imap.example.com", n)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("config.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("nested/dir/config.json"));

        store.add_or_update("bob@example.com", settings(993)).unwrap();
        store.add_or_update("alice@example.com", settings(143)).unwrap();

        let loaded = store.load().unwrap();
        let keys: Vec<_> = loaded.keys().cloned().collect();
        assert_eq!(keys, vec!["alice@example.com", "bob@example.com"]);
        assert_eq!(loaded["alice@example.com"].imap_port, 143);
        assert!(!dir.path().join("nested/dir/config.json.tmp").exists());
    }

    #[test]
    fn test_overwrite_returns_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("config.json"));

        assert!(store.add_or_update("a@example.com", settings(1)).unwrap().is_none());
        let previous = store.add_or_update("a@example.com", settings(2)).unwrap();
        assert_eq!(previous, Some(settings(1)));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("config.json"));
        store.add_or_update("a@example.com", settings(993)).unwrap();

        assert_eq!(store.remove("a@example.com").unwrap(), Some(settings(993)));
        assert_eq!(store.remove("a@example.com").unwrap(), None);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::at(&path);
        store.add_or_update("a@example.com", settings(993)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["accounts"]["a@example.com"]["imap_port"], 993);
        assert_eq!(value["accounts"]["a@example.com"]["smtp_server"], "smtp.example.com");
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"version": 2, "accounts": {"a@example.com": {"smtp_server": "s", "smtp_port": 25, "imap_server": "i", "imap_port": 993, "theme": "dark"}}}"#,
        )
        .unwrap();

        let loaded = ConfigStore::at(&path).load().unwrap();
        assert_eq!(loaded["a@example.com"], ConnectionSettings::new("s", 25, "i", 993));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = ConfigStore::at(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
