//! Package manager functionality.
//!
//! Provides utilities for:
//! - Parsing package references (name, @scope/name, name@version)
//! - Reading registry settings from `.npmrc`
//! - Fetching package metadata and version documents from the registry
//! - Resolving dist-tags and exact versions
//! - Downloading and extracting tarballs
//! - Reading and writing the project manifest and lock file
//! - Installing and uninstalling packages concurrently

pub mod error;
pub mod install;
pub mod lockfile;
pub mod manifest;
pub mod npmrc;
pub mod registry;
pub mod spec;
pub mod tarball;
pub mod version;

pub use error::{codes as pkg_codes, ErrorKind, PkgError};
pub use install::{
    install_limit, InstallReport, InstallStage, Installer, PackageFailure, ResolvedInstall,
    UninstallOutcome, UninstallReport,
};
pub use lockfile::{LockEntry, LockStore, Lockfile};
pub use manifest::{InitOutcome, Manifest, ManifestStore};
pub use npmrc::{load_npmrc_files, parse_npmrc, NpmrcConfig};
pub use registry::{Dist, Packument, RegistryClient, VersionDoc};
pub use spec::{PackageRef, LATEST};
pub use tarball::{download_to_file, extract_tgz, MAX_TARBALL_SIZE};
pub use version::{is_safe_version, resolve_version};
