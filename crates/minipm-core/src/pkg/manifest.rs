//! Dependency manifest (`package.json`) store.
//!
//! Every mutation is a read-modify-write of the whole file: the manifest is
//! reloaded, one key is changed, and the full document is written back
//! atomically. Fields the store does not know about are carried through
//! unchanged.

use super::error::PkgError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Version written into fresh manifests.
pub const DEFAULT_PROJECT_VERSION: &str = "1.0.0";

/// Entry point written by `init`.
pub const DEFAULT_ENTRY_POINT: &str = "index.js";

/// Placeholder test script written by `init`.
pub const PLACEHOLDER_TEST_SCRIPT: &str = "echo \"Error: no test specified\" && exit 1";

/// The dependency manifest.
///
/// Only the two dependency groups are typed. Every other top-level key is
/// kept as raw JSON in its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    fields: Map<String, Value>,
}

impl Manifest {
    /// Throwaway manifest used when none exists yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String(name.into()));
        fields.insert(
            "version".to_string(),
            Value::String(DEFAULT_PROJECT_VERSION.to_string()),
        );
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Manifest written by `init`.
    #[must_use]
    pub fn template(name: impl Into<String>) -> Self {
        let mut manifest = Self::new(name);
        let fields = &mut manifest.fields;
        fields.insert("description".to_string(), Value::String(String::new()));
        fields.insert(
            "main".to_string(),
            Value::String(DEFAULT_ENTRY_POINT.to_string()),
        );
        fields.insert(
            "scripts".to_string(),
            json!({ "test": PLACEHOLDER_TEST_SCRIPT }),
        );
        fields.insert("keywords".to_string(), Value::Array(Vec::new()));
        fields.insert("author".to_string(), Value::String(String::new()));
        fields.insert("license".to_string(), Value::String("ISC".to_string()));
        manifest
    }

    /// Parse a manifest document.
    ///
    /// # Errors
    /// `PKG_MANIFEST_INVALID` if the document is not a JSON object or a
    /// dependency group is not an object of strings.
    pub fn from_json(content: &str) -> Result<Self, PkgError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| PkgError::manifest_invalid(format!("Invalid JSON: {e}")))?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(PkgError::manifest_invalid(format!(
                    "package.json must be a JSON object, got {}",
                    json_type_name(&other)
                )));
            }
        };

        Ok(Self {
            dependencies: read_group(&fields, "dependencies")?,
            dev_dependencies: read_group(&fields, "devDependencies")?,
            fields,
        })
    }

    /// Top-level `name`, if it is a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Top-level `version`, if it is a string.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.fields.get("version").and_then(Value::as_str)
    }

    /// Raw value of any top-level key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn group_mut(&mut self, is_dev: bool) -> &mut BTreeMap<String, String> {
        if is_dev {
            &mut self.dev_dependencies
        } else {
            &mut self.dependencies
        }
    }

    /// Requested version of `name` in either group (regular first).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.dependencies
            .get(name)
            .or_else(|| self.dev_dependencies.get(name))
            .map(String::as_str)
    }

    /// Whether `name` appears in either group.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All declared dependencies as `(name, version, is_dev)`.
    ///
    /// A name present in both groups is reported once, as a regular dependency.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String, bool)> {
        let regular = self
            .dependencies
            .iter()
            .map(|(n, v)| (n.clone(), v.clone(), false));
        let dev = self
            .dev_dependencies
            .iter()
            .filter(|(n, _)| !self.dependencies.contains_key(*n))
            .map(|(n, v)| (n.clone(), v.clone(), true));
        regular.chain(dev).collect()
    }

    /// Set `name -> version` in the group selected by `is_dev`.
    ///
    /// An entry in the other group is left in place.
    pub fn set(&mut self, name: &str, version: &str, is_dev: bool) {
        self.group_mut(is_dev)
            .insert(name.to_string(), version.to_string());
    }

    /// Remove `name` from both groups. Returns `true` if anything was removed.
    pub fn unset(&mut self, name: &str) -> bool {
        let regular = self.dependencies.remove(name).is_some();
        let dev = self.dev_dependencies.remove(name).is_some();
        regular || dev
    }

    /// Serialize as pretty JSON with a trailing newline.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, PkgError> {
        // insert keeps an existing key in place, so groups stay where they were
        let mut fields = self.fields.clone();
        fields.insert(
            "dependencies".to_string(),
            group_value(&self.dependencies),
        );
        fields.insert(
            "devDependencies".to_string(),
            group_value(&self.dev_dependencies),
        );
        serde_json::to_string_pretty(&Value::Object(fields))
            .map(|s| s + "\n")
            .map_err(|e| PkgError::manifest_write_failed(format!("Failed to serialize: {e}")))
    }
}

fn read_group(
    fields: &Map<String, Value>,
    key: &str,
) -> Result<BTreeMap<String, String>, PkgError> {
    let obj = match fields.get(key) {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            return Err(PkgError::manifest_invalid(format!(
                "'{key}' must be an object, got {}",
                json_type_name(other)
            )));
        }
    };

    obj.iter()
        .map(|(name, range)| match range.as_str() {
            Some(range) => Ok((name.clone(), range.to_string())),
            None => Err(PkgError::manifest_invalid(format!(
                "'{key}.{name}' must be a string, got {}",
                json_type_name(range)
            ))),
        })
        .collect()
}

fn group_value(group: &BTreeMap<String, String>) -> Value {
    Value::Object(
        group
            .iter()
            .map(|(name, range)| (name.clone(), Value::String(range.clone())))
            .collect(),
    )
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of [`ManifestStore::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// File-backed manifest store.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    default_name: String,
}

impl ManifestStore {
    /// Create a store for the manifest at `path`.
    ///
    /// `default_name` is the project name used when a fresh manifest is written.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, default_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_name: default_name.into(),
        }
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the manifest file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the manifest.
    ///
    /// # Errors
    /// `PKG_MANIFEST_NOT_FOUND` if absent, `PKG_MANIFEST_INVALID` if unreadable.
    pub fn load(&self) -> Result<Manifest, PkgError> {
        self.try_load()?
            .ok_or_else(|| PkgError::manifest_not_found(&self.path))
    }

    /// Load the manifest, or a throwaway default if none exists.
    ///
    /// # Errors
    /// `PKG_MANIFEST_INVALID` if the file exists but cannot be parsed.
    pub fn load_or_default(&self) -> Result<Manifest, PkgError> {
        Ok(self
            .try_load()?
            .unwrap_or_else(|| Manifest::new(self.default_name.clone())))
    }

    fn try_load(&self) -> Result<Option<Manifest>, PkgError> {
        let Some(content) = minipm_util::fs::read_if_exists(&self.path)
            .map_err(|e| PkgError::manifest_invalid(format!("Failed to read: {e}")))?
        else {
            return Ok(None);
        };

        Manifest::from_json(&content).map(Some)
    }

    /// Write the full manifest atomically.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, manifest: &Manifest) -> Result<(), PkgError> {
        let content = manifest.to_json()?;
        minipm_util::fs::atomic_write(&self.path, content.as_bytes()).map_err(|e| {
            PkgError::manifest_write_failed(format!(
                "Failed to write {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Set `name -> version` in the selected group (read-modify-write).
    ///
    /// Creates the manifest if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be read or written.
    pub fn upsert(&self, name: &str, version: &str, is_dev: bool) -> Result<(), PkgError> {
        let mut manifest = self.load_or_default()?;
        manifest.set(name, version, is_dev);
        self.save(&manifest)
    }

    /// Remove `name` from both groups (read-modify-write).
    ///
    /// A missing manifest or absent key is not an error and writes nothing.
    /// Returns `true` if the manifest changed.
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be read or written.
    pub fn remove(&self, name: &str) -> Result<bool, PkgError> {
        let Some(mut manifest) = self.try_load()? else {
            return Ok(false);
        };
        if !manifest.unset(name) {
            return Ok(false);
        }
        self.save(&manifest)?;
        Ok(true)
    }

    /// Write a template manifest unless one already exists.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn init(&self) -> Result<InitOutcome, PkgError> {
        if self.path.exists() {
            return Ok(InitOutcome::AlreadyExists);
        }

        let content = Manifest::template(self.default_name.clone()).to_json()?;

        // create_new so a concurrently created manifest is never clobbered
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path);
        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(InitOutcome::AlreadyExists);
            }
            Err(e) => {
                return Err(PkgError::manifest_write_failed(format!(
                    "Failed to create {}: {e}",
                    self.path.display()
                )));
            }
        };

        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                PkgError::manifest_write_failed(format!(
                    "Failed to write {}: {e}",
                    self.path.display()
                ))
            })?;

        Ok(InitOutcome::Created)
    }
}
