//! API key storage
//!
//! Keys are stored per server and user in a YAML file readable only by its
//! owner. Entries are keyed by `jcli::{address}` so one file can hold keys
//! for several servers.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable that overrides any stored key
pub const API_KEY_ENV: &str = "JCLI_API_KEY";

const SERVICE_PREFIX: &str = "jcli::";

/// Errors raised by a [`CredentialStore`]
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The store could not be read or written
    #[error("Credential store {path} is not accessible: {source}")]
    Io {
        /// Path of the store.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The store exists but is not valid YAML
    #[error("Credential store {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the store.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// No user configuration directory could be found
    #[error("No configuration directory available for the credential store")]
    NoConfigDir,
}

/// Looks up and persists API keys
pub trait CredentialStore {
    /// Returns the key stored for `user` on `address`, if any
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the backing store cannot be read.
    fn load(&self, address: &str, user: &str) -> Result<Option<String>, CredentialError>;

    /// Stores `api_key` for `user` on `address`, replacing any previous key
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the backing store cannot be written.
    fn save(&self, address: &str, user: &str, api_key: &str) -> Result<(), CredentialError>;
}

type Entries = BTreeMap<String, BTreeMap<String, String>>;

fn service_name(address: &str) -> String {
    format!("{SERVICE_PREFIX}{}", address.trim_end_matches('/'))
}

/// YAML file backed store
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at an explicit path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config_dir>/jcli/credentials.yaml`
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NoConfigDir`] if the platform has no
    /// configuration directory.
    pub fn default_location() -> Result<Self, CredentialError> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join("jcli").join("credentials.yaml")))
            .ok_or(CredentialError::NoConfigDir)
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_entries(&self) -> Result<Entries, CredentialError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if text.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_yaml::from_str(&text).map_err(|e| CredentialError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write_entries(&self, entries: &Entries) -> Result<(), CredentialError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let text = serde_yaml::to_string(entries).map_err(|e| CredentialError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| self.io_error(e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, address: &str, user: &str) -> Result<Option<String>, CredentialError> {
        let mut entries = self.read_entries()?;
        Ok(entries
            .remove(&service_name(address))
            .and_then(|mut users| users.remove(user)))
    }

    fn save(&self, address: &str, user: &str, api_key: &str) -> Result<(), CredentialError> {
        let mut entries = self.read_entries()?;
        entries
            .entry(service_name(address))
            .or_default()
            .insert(user.to_string(), api_key.to_string());
        self.write_entries(&entries)?;
        tracing::info!(address = %address, user = %user, path = %self.path.display(), "Saved API key");
        Ok(())
    }
}

/// Store wrapper that prefers a key from the environment
#[derive(Debug, Clone)]
pub struct EnvOverride<S> {
    inner: S,
    key: Option<String>,
}

impl<S: CredentialStore> EnvOverride<S> {
    /// Wraps `inner`, reading the override from [`API_KEY_ENV`]
    #[must_use]
    pub fn from_env(inner: S) -> Self {
        let key = std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty());
        Self::with_key(inner, key)
    }

    /// Wraps `inner` with an explicit override
    #[must_use]
    pub fn with_key(inner: S, key: Option<String>) -> Self {
        Self { inner, key }
    }
}

impl<S: CredentialStore> CredentialStore for EnvOverride<S> {
    fn load(&self, address: &str, user: &str) -> Result<Option<String>, CredentialError> {
        match &self.key {
            Some(key) => {
                tracing::debug!("Using API key from {API_KEY_ENV}");
                Ok(Some(key.clone()))
            }
            None => self.inner.load(address, user),
        }
    }

    fn save(&self, address: &str, user: &str, api_key: &str) -> Result<(), CredentialError> {
        self.inner.save(address, user, api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, FileCredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("jcli").join("credentials.yaml"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_has_no_key() {
        let (_dir, store) = store();
        assert_eq!(store.load("http://host", "alice").unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = store();
        store.save("http://host", "alice", "k1").unwrap();
        store.save("http://host", "bob", "k2").unwrap();
        store.save("http://other", "alice", "k3").unwrap();

        assert_eq!(store.load("http://host", "alice").unwrap().as_deref(), Some("k1"));
        assert_eq!(store.load("http://host/", "bob").unwrap().as_deref(), Some("k2"));
        assert_eq!(store.load("http://other", "alice").unwrap().as_deref(), Some("k3"));
        assert_eq!(store.load("http://other", "bob").unwrap(), None);
    }

    #[test]
    fn test_save_overwrites() {
        let (_dir, store) = store();
        store.save("http://host", "alice", "old").unwrap();
        store.save("http://host", "alice", "new").unwrap();
        assert_eq!(store.load("http://host", "alice").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_file_layout() {
        let (_dir, store) = store();
        store.save("http://host", "alice", "k1").unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("jcli::http://host"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        store.save("http://host", "alice", "k1").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "- just\n- a list\n").unwrap();
        assert!(matches!(
            store.load("http://host", "alice"),
            Err(CredentialError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_env_override_wins() {
        let (_dir, store) = store();
        store.save("http://host", "alice", "stored").unwrap();

        let overridden = EnvOverride::with_key(store.clone(), Some("from-env".to_string()));
        assert_eq!(
            overridden.load("http://host", "alice").unwrap().as_deref(),
            Some("from-env")
        );

        let passthrough = EnvOverride::with_key(store, None);
        assert_eq!(
            passthrough.load("http://host", "alice").unwrap().as_deref(),
            Some("stored")
        );
    }
}
