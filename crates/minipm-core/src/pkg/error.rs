//! Package manager error types.

use serde::Serialize;
use std::fmt;
use std::io;

/// Package manager error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_IO_ERROR: &str = "PKG_IO_ERROR";
    pub const PKG_CONFIG_INVALID: &str = "PKG_CONFIG_INVALID";

    pub const PKG_MANIFEST_NOT_FOUND: &str = "PKG_MANIFEST_NOT_FOUND";
    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";
    pub const PKG_MANIFEST_WRITE_FAILED: &str = "PKG_MANIFEST_WRITE_FAILED";

    pub const PKG_LOCK_INVALID: &str = "PKG_LOCK_INVALID";
    pub const PKG_LOCK_WRITE_FAILED: &str = "PKG_LOCK_WRITE_FAILED";
}

/// Coarse failure category, used to tell per-package recoverable failures
/// apart from fatal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Registry has no such package or version.
    NotFound,
    /// Transport failure reaching the registry or tarball host.
    Network,
    /// Archive could not be decoded or extracted.
    CorruptArchive,
    /// Filesystem failure.
    Io,
    /// An operation that needs a manifest found none.
    ManifestMissing,
    /// Malformed input (package spec, manifest, lock file, config).
    Invalid,
}

/// Package manager error.
#[derive(Debug, Clone)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            codes::PKG_NOT_FOUND | codes::PKG_VERSION_NOT_FOUND => ErrorKind::NotFound,
            codes::PKG_REGISTRY_ERROR | codes::PKG_DOWNLOAD_FAILED => ErrorKind::Network,
            codes::PKG_EXTRACT_FAILED => ErrorKind::CorruptArchive,
            codes::PKG_MANIFEST_NOT_FOUND => ErrorKind::ManifestMissing,
            codes::PKG_SPEC_INVALID
            | codes::PKG_MANIFEST_INVALID
            | codes::PKG_LOCK_INVALID
            | codes::PKG_CONFIG_INVALID => ErrorKind::Invalid,
            _ => ErrorKind::Io,
        }
    }

    /// Whether this is a "no such package/version" failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"))
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, version: &str) -> Self {
        Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("Version {version} of {name} not found in registry"),
        )
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// Create a download failed error.
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_DOWNLOAD_FAILED, msg)
    }

    /// Create an extraction failed error.
    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, msg)
    }

    /// Create a filesystem error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_IO_ERROR, msg)
    }

    /// Create a manifest not found error.
    #[must_use]
    pub fn manifest_not_found(path: &std::path::Path) -> Self {
        Self::new(
            codes::PKG_MANIFEST_NOT_FOUND,
            format!("package.json not found: {}", path.display()),
        )
    }

    /// Create a manifest invalid error.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_INVALID, msg)
    }

    /// Create a manifest write failed error.
    pub fn manifest_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_WRITE_FAILED, msg)
    }

    /// Create a lock file invalid error.
    pub fn lock_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCK_INVALID, msg)
    }

    /// Create a lock file write failed error.
    pub fn lock_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCK_WRITE_FAILED, msg)
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_IO_ERROR, e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Connection failed: {e}"))
        } else {
            Self::new(codes::PKG_REGISTRY_ERROR, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, format!("Invalid JSON: {e}"))
    }
}

impl From<crate::error::Error> for PkgError {
    fn from(e: crate::error::Error) -> Self {
        Self::new(codes::PKG_CONFIG_INVALID, e.to_string())
    }
}
