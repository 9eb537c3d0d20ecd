//! Long-term secrets of principals and services.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::crypto::{self, MasterKey, RootKey};
use crate::config::ConfigError;

#[derive(Serialize, Deserialize)]
struct SecretEntry {
    user: String,
    secret: String,
}

#[derive(Serialize, Deserialize, Default)]
struct SecretsFile {
    #[serde(default)]
    secrets: Vec<SecretEntry>,
}

/// Identity to secret map, read-mostly and shared behind an `Arc`.
#[derive(Default)]
pub struct SecretStore {
    secrets: HashMap<String, Zeroizing<String>>,
}

impl SecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{"secrets":[{"user":..,"secret":..}]}`. Duplicate users keep
    /// their first entry.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: SecretsFile = serde_json::from_str(json)?;
        let mut store = Self::new();
        for entry in file.secrets {
            if !store.add(&entry.user, &entry.secret) {
                warn!(user = %entry.user, "duplicate secrets entry ignored");
            }
        }
        Ok(store)
    }

    /// Load from a JSON file. A missing file yields an empty store.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let store = Self::from_json(&json)?;
                debug!(path = %path.display(), entries = store.len(), "loaded secrets");
                Ok(store)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "secrets file not found, starting empty");
                Ok(Self::new())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Serialize in the file format read by [`SecretStore::from_json`],
    /// sorted by identity.
    pub fn to_json(&self) -> Result<Zeroizing<String>, ConfigError> {
        let mut users: Vec<&String> = self.secrets.keys().collect();
        users.sort();
        let file = SecretsFile {
            secrets: users
                .into_iter()
                .map(|user| SecretEntry {
                    user: user.clone(),
                    secret: self.secrets[user].as_str().to_owned(),
                })
                .collect(),
        };
        Ok(Zeroizing::new(serde_json::to_string_pretty(&file)?))
    }

    /// Write the store to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Register `identity`; returns `false` if it is already present.
    pub fn add(&mut self, identity: &str, secret: &str) -> bool {
        match self.secrets.entry(identity.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Zeroizing::new(secret.to_owned()));
                true
            }
        }
    }

    /// Secret registered for `identity`.
    #[must_use]
    pub fn lookup(&self, identity: &str) -> Option<&str> {
        self.secrets.get(identity).map(|secret| secret.as_str())
    }

    /// Whether `identity` is registered.
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.secrets.contains_key(identity)
    }

    /// Root key of a registered principal.
    #[must_use]
    pub fn derive_key(&self, identity: &str) -> Option<RootKey> {
        let secret = self.lookup(identity)?;
        crypto::derive_root_key(identity, secret).ok()
    }

    /// Master key of a registered service.
    #[must_use]
    pub fn master_key(&self, service: &str) -> Option<MasterKey> {
        let secret = self.lookup(service)?;
        crypto::derive_master_key(service, secret).ok()
    }

    /// Number of registered identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("entries", &self.secrets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::derive_root_key;

    const SAMPLE: &str = r#"{
        "secrets": [
            {"user": "alice", "secret": "s3cret"},
            {"user": "echo", "secret": "echo-secret"},
            {"user": "alice", "secret": "shadowed"}
        ]
    }"#;

    #[test]
    fn test_from_json_keeps_first_duplicate() {
        let store = SecretStore::from_json(SAMPLE).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("alice"), Some("s3cret"));
        assert_eq!(store.lookup("echo"), Some("echo-secret"));
        assert_eq!(store.lookup("bob"), None);
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let mut store = SecretStore::new();
        assert!(store.add("alice", "one"));
        assert!(!store.add("alice", "two"));
        assert_eq!(store.lookup("alice"), Some("one"));
    }

    #[test]
    fn test_derive_key_matches_free_function() {
        let mut store = SecretStore::new();
        store.add("alice", "s3cret");

        let key = store.derive_key("alice").unwrap();
        assert_eq!(key, derive_root_key("alice", "s3cret").unwrap());
        assert!(store.derive_key("mallory").is_none());
        assert!(store.master_key("doesnotexist").is_none());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::from_file(dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");

        let mut store = SecretStore::new();
        store.add("bob", "hunter2");
        store.add("alice", "s3cret");
        store.save(&path).unwrap();

        let loaded = SecretStore::from_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup("alice"), Some("s3cret"));
        assert_eq!(loaded.lookup("bob"), Some("hunter2"));
    }

    #[test]
    fn test_rejects_malformed_file() {
        assert!(SecretStore::from_json(r#"{"secrets":[{"user":"alice"}]}"#).is_err());
        assert!(SecretStore::from_json("not json").is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut store = SecretStore::new();
        store.add("alice", "s3cret");
        let debug = format!("{store:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("alice"));
    }
}
