//! Resolved-lock file store.
//!
//! The lock file records the exact version, source URL and integrity digest
//! of every installed package:
//!
//! ```json
//! {
//!   "left-pad": {
//!     "version": "1.3.0",
//!     "resolved": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
//!     "integrity": "5b8a3a7765dfe001261dde915589e782f8c94d1e"
//!   }
//! }
//! ```
//!
//! A package on disk without a lock entry is treated as "not yet locked".

use super::error::PkgError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A locked package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Resolved version string (never "latest").
    pub version: String,
    /// Tarball URL the package was installed from.
    pub resolved: String,
    /// Digest copied from registry metadata.
    pub integrity: String,
}

impl LockEntry {
    /// Create a new locked package entry.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        resolved: impl Into<String>,
        integrity: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            resolved: resolved.into(),
            integrity: integrity.into(),
        }
    }
}

/// The complete lock mapping (`name -> LockEntry`).
///
/// `BTreeMap` keeps the file ordering deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lockfile {
    pub packages: BTreeMap<String, LockEntry>,
}

impl Lockfile {
    /// Get the entry for a package.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        self.packages.get(name)
    }

    /// Number of locked packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no package is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Deserialize from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, PkgError> {
        serde_json::from_str(json)
            .map_err(|e| PkgError::lock_invalid(format!("Invalid lock file JSON: {e}")))
    }

    /// Serialize as pretty JSON with a trailing newline.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, PkgError> {
        serde_json::to_string_pretty(self)
            .map(|s| s + "\n")
            .map_err(|e| PkgError::lock_write_failed(format!("Failed to serialize: {e}")))
    }
}

/// File-backed lock store. Every mutation rewrites the whole file.
#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
}

impl LockStore {
    /// Create a store for the lock file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the lock file; a missing file is an empty lock.
    ///
    /// # Errors
    /// `PKG_LOCK_INVALID` if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Lockfile, PkgError> {
        match minipm_util::fs::read_if_exists(&self.path) {
            Ok(Some(content)) => Lockfile::from_json(&content),
            Ok(None) => Ok(Lockfile::default()),
            Err(e) => Err(PkgError::lock_invalid(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Write the full lock file atomically.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, lockfile: &Lockfile) -> Result<(), PkgError> {
        let content = lockfile.to_json()?;
        minipm_util::fs::atomic_write(&self.path, content.as_bytes()).map_err(|e| {
            PkgError::lock_write_failed(format!("Failed to write {}: {e}", self.path.display()))
        })
    }

    /// Lock entry for one package, if any.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be loaded.
    pub fn get(&self, name: &str) -> Result<Option<LockEntry>, PkgError> {
        Ok(self.load()?.packages.remove(name))
    }

    /// Set one package's entry (read-modify-write).
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be read or written.
    pub fn upsert(&self, name: &str, entry: LockEntry) -> Result<(), PkgError> {
        let mut lockfile = self.load()?;
        lockfile.packages.insert(name.to_string(), entry);
        self.save(&lockfile)
    }

    /// Remove one package's entry. An absent key is not an error and writes nothing.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be read or written.
    pub fn remove(&self, name: &str) -> Result<bool, PkgError> {
        let mut lockfile = self.load()?;
        if lockfile.packages.remove(name).is_none() {
            return Ok(false);
        }
        self.save(&lockfile)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use std::fs;
    use tempfile::tempdir;

    fn entry(version: &str) -> LockEntry {
        LockEntry::new(
            version,
            format!("https://registry.npmjs.org/a/-/a-{version}.tgz"),
            "abc123",
        )
    }

    #[test]
    fn test_missing_is_empty() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_file_format() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        store.upsert("a", entry("1.0.0")).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "a": {
                    "version": "1.0.0",
                    "resolved": "https://registry.npmjs.org/a/-/a-1.0.0.tgz",
                    "integrity": "abc123"
                }
            })
        );
    }

    #[test]
    fn test_upsert_keeps_other_entries() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        store.upsert("a", entry("1.0.0")).unwrap();
        store.upsert("b", entry("2.0.0")).unwrap();
        store.upsert("a", entry("1.1.0")).unwrap();

        let lock = store.load().unwrap();
        assert_eq!(lock.len(), 2);
        assert_eq!(lock.get("a").unwrap().version, "1.1.0");
        assert_eq!(lock.get("b").unwrap().version, "2.0.0");
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        store.upsert("a", entry("1.0.0")).unwrap();
        store.upsert("b", entry("2.0.0")).unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(!store.remove("never").unwrap());

        let lock = store.load().unwrap();
        assert!(lock.get("a").is_none());
        assert!(lock.get("b").is_some());
    }

    #[test]
    fn test_remove_absent_does_not_create_file() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        assert!(!store.remove("a").unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        fs::write(store.path(), "[1, 2").unwrap();

        let err = store.load().unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCK_INVALID);
    }

    #[test]
    fn test_invalid_utf8_left_untouched() {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path().join("minipm-lock.json"));
        let bytes = [b'{', b'"', 0xFF, 0xFE, b'"', b':', b'1', b'}'];
        fs::write(store.path(), bytes).unwrap();

        let err = store.upsert("a", entry("1.0.0")).unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCK_INVALID);
        assert_eq!(fs::read(store.path()).unwrap(), bytes);
    }
}
