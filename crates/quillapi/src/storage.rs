//! Persistent client storage
//!
//! String key/value pairs kept in a single JSON file, `storage.json`, inside
//! the client data directory. Every write is flushed before it returns.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Key holding the bearer credential
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Key holding the signed-in user document
pub const USER_KEY: &str = "user";

const STORAGE_FILE: &str = "storage.json";

/// File-backed key/value store for credentials and session data
pub struct ClientStorage {
    /// Path to the storage file
    path: PathBuf,

    /// In-memory copy of the file
    entries: RwLock<BTreeMap<String, String>>,
}

impl ClientStorage {
    /// Open or create the storage in the given directory
    ///
    /// # Arguments
    /// * `dir` - Client data directory
    ///
    /// # Returns
    /// * `Result<ClientStorage>` - Storage handle
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(STORAGE_FILE);
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?
            }
        } else {
            BTreeMap::new()
        };

        info!("Client storage opened at {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Set a value and flush to disk; memory is unchanged if the flush fails
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        debug!(key, "storage key set");
        Ok(())
    }

    /// Remove a key and flush to disk
    ///
    /// # Returns
    /// * `Result<bool>` - Whether the key was present
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        debug!(key, "storage key removed");
        Ok(true)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the storage is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::Storage(e.to_string()))?;

        // Replace atomically via rename
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
