//! Install/uninstall orchestration.
//!
//! Each package goes through its own pipeline:
//!
//! ```text
//! Pending -> VersionResolved -> DirectoryEnsured -> Downloading -> Extracting
//!         -> ManifestUpdated -> Locked
//! ```
//!
//! Any step can fail; the failure records the stage the pipeline was trying
//! to reach and nothing is rolled back. Pipelines of different packages run
//! concurrently under a dynamic limit, while manifest and lock writes go
//! through a single writer so concurrent pipelines never lose each other's
//! updates.

use super::error::{ErrorKind, PkgError};
use super::lockfile::{LockEntry, LockStore};
use super::manifest::{InitOutcome, ManifestStore};
use super::registry::RegistryClient;
use super::spec::PackageRef;
use super::tarball::{download_to_file, extract_tgz, MAX_TARBALL_SIZE};
use super::version::{is_safe_version, resolve_version};
use crate::config::Config;
use futures::stream::{self, StreamExt};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Dynamic concurrency limit: `ceil(total / 2)`, at least 1, at most `cap`.
///
/// More packages means more parallelism, up to the cap.
#[must_use]
pub fn install_limit(total: usize, cap: usize) -> usize {
    total.div_ceil(2).min(cap).max(1)
}

/// Per-package install pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Pending,
    VersionResolved,
    DirectoryEnsured,
    Downloading,
    Extracting,
    ManifestUpdated,
    Locked,
}

/// Output of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInstall {
    pub name: String,
    /// Version token as requested (may be "latest").
    pub requested: String,
    /// Exact installed version.
    pub version: String,
    /// Tarball URL used.
    pub resolved: String,
    pub integrity: String,
    pub dev: bool,
}

/// A per-package failure, reported to the fan-in aggregator.
#[derive(Debug, Clone)]
pub struct PackageFailure {
    pub name: String,
    /// Install stage that could not be reached; `None` for uninstalls.
    pub stage: Option<InstallStage>,
    pub error: PkgError,
}

impl PackageFailure {
    fn at(name: &str, stage: InstallStage, error: PkgError) -> Self {
        Self {
            name: name.to_string(),
            stage: Some(stage),
            error,
        }
    }

    /// Failure category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl std::fmt::Display for PackageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} ({stage:?}): {}", self.name, self.error),
            None => write!(f, "{}: {}", self.name, self.error),
        }
    }
}

impl std::error::Error for PackageFailure {}

impl Serialize for PackageFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PackageFailure", 5)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("stage", &self.stage)?;
        s.serialize_field("kind", &self.error.kind())?;
        s.serialize_field("code", self.error.code())?;
        s.serialize_field("message", self.error.message())?;
        s.end()
    }
}

/// Aggregate result of a fan-out install.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub installed: Vec<ResolvedInstall>,
    pub failures: Vec<PackageFailure>,
    pub notes: Vec<String>,
    /// Concurrency limit used for this batch.
    pub concurrency_limit: usize,
    /// Most pipelines observed running at the same time.
    pub peak_in_flight: usize,
}

impl InstallReport {
    /// Whether every package installed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of uninstalling one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UninstallOutcome {
    Removed,
    /// No module directory existed; nothing was touched.
    NotInstalled,
}

/// Aggregate result of a fan-out uninstall.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallReport {
    pub removed: Vec<String>,
    pub not_installed: Vec<String>,
    pub failures: Vec<PackageFailure>,
    pub notes: Vec<String>,
}

impl UninstallReport {
    /// Whether every uninstall succeeded.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tracks how many pipelines are running and the peak.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Install/uninstall orchestrator for one project.
#[derive(Debug)]
pub struct Installer {
    config: Config,
    registry: RegistryClient,
    manifest: ManifestStore,
    lock: LockStore,
    /// Serialises manifest and lock read-modify-write cycles.
    writer: Mutex<()>,
}

impl Installer {
    /// Create an orchestrator for the project described by `config`.
    #[must_use]
    pub fn new(config: Config, registry: RegistryClient) -> Self {
        let manifest = ManifestStore::new(config.manifest_path(), config.default_project_name());
        let lock = LockStore::new(config.lockfile_path());
        Self {
            config,
            registry,
            manifest,
            lock,
            writer: Mutex::new(()),
        }
    }

    /// Project configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Manifest store.
    #[must_use]
    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    /// Lock store.
    #[must_use]
    pub fn lock(&self) -> &LockStore {
        &self.lock
    }

    /// Write a template manifest unless one exists.
    pub async fn init(&self) -> Result<InitOutcome, PkgError> {
        let _guard = self.writer.lock().await;
        let outcome = self.manifest.init()?;
        info!(path = %self.manifest.path().display(), ?outcome, "init");
        Ok(outcome)
    }

    /// Install one package, then record it in the manifest and lock file.
    ///
    /// The version is resolved before anything is written, so an unknown
    /// package or version leaves the filesystem untouched. Later failures
    /// leave whatever was already written in place.
    pub async fn install_one(&self, pkg: &PackageRef) -> Result<ResolvedInstall, PackageFailure> {
        let name = pkg.name.as_str();
        let requested = pkg.requested_version();
        debug!(name, requested, dev = pkg.is_dev, "install pending");

        // Resolve
        let stage = InstallStage::VersionResolved;
        let packument = self
            .registry
            .fetch_metadata(name)
            .await
            .map_err(|e| PackageFailure::at(name, stage, e))?;
        let version =
            resolve_version(&packument, requested).map_err(|e| PackageFailure::at(name, stage, e))?;
        if !is_safe_version(&version) {
            return Err(PackageFailure::at(
                name,
                stage,
                PkgError::registry(format!("Registry returned unusable version '{version}'")),
            ));
        }
        let tarball_url = packument
            .version(&version)
            .map(|doc| doc.dist.tarball.clone())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                PackageFailure::at(
                    name,
                    stage,
                    PkgError::download_failed(format!("No tarball URL for {name}@{version}")),
                )
            })?;
        debug!(name, %version, "version resolved");

        // Directory
        let stage = InstallStage::DirectoryEnsured;
        let target_dir = self.config.module_dir(name);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| {
                PackageFailure::at(
                    name,
                    stage,
                    PkgError::io(format!("Failed to create {}: {e}", target_dir.display())),
                )
            })?;

        // Download
        let stage = InstallStage::Downloading;
        let tarball_path = target_dir.join(pkg.tarball_file_name(&version));
        debug!(name, url = %tarball_url, "downloading tarball");
        let response = self
            .registry
            .fetch_tarball(&tarball_url)
            .await
            .map_err(|e| PackageFailure::at(name, stage, e))?;
        let size = download_to_file(response, &tarball_path, MAX_TARBALL_SIZE)
            .await
            .map_err(|e| PackageFailure::at(name, stage, e))?;
        debug!(name, size, "downloaded tarball");

        // Extract
        let stage = InstallStage::Extracting;
        let files = extract_blocking(tarball_path.clone(), target_dir.clone())
            .await
            .map_err(|e| PackageFailure::at(name, stage, e))?;
        tokio::fs::remove_file(&tarball_path).await.map_err(|e| {
            PackageFailure::at(
                name,
                stage,
                PkgError::io(format!("Failed to remove {}: {e}", tarball_path.display())),
            )
        })?;
        debug!(name, files, dir = %target_dir.display(), "extracted");

        // Manifest keeps the requested token; the lock file gets the concrete resolution
        let stage = InstallStage::ManifestUpdated;
        {
            let _guard = self.writer.lock().await;
            self.manifest
                .upsert(name, requested, pkg.is_dev)
                .map_err(|e| PackageFailure::at(name, stage, e))?;
        }

        let stage = InstallStage::Locked;
        let doc = self
            .registry
            .fetch_version(name, &version)
            .await
            .map_err(|e| PackageFailure::at(name, stage, e))?;
        let entry = LockEntry::new(&doc.version, &doc.dist.tarball, doc.dist.digest());
        {
            let _guard = self.writer.lock().await;
            self.lock
                .upsert(name, entry.clone())
                .map_err(|e| PackageFailure::at(name, stage, e))?;
        }

        info!(name, version = %entry.version, "installed");

        Ok(ResolvedInstall {
            name: name.to_string(),
            requested: requested.to_string(),
            version: entry.version,
            resolved: entry.resolved,
            integrity: entry.integrity,
            dev: pkg.is_dev,
        })
    }

    /// Install a batch of packages concurrently.
    ///
    /// Every pipeline runs to completion; failures are collected, never
    /// short-circuit siblings.
    pub async fn install_many(&self, packages: Vec<PackageRef>) -> InstallReport {
        let limit = install_limit(packages.len(), self.config.concurrency_cap);
        let in_flight = InFlight::default();
        debug!(count = packages.len(), limit, "installing batch");

        let results: Vec<Result<ResolvedInstall, PackageFailure>> = stream::iter(packages)
            .map(|pkg| {
                let in_flight = &in_flight;
                async move {
                    let _slot = in_flight.enter();
                    self.install_one(&pkg).await
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = InstallReport {
            concurrency_limit: limit,
            peak_in_flight: in_flight.peak(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(installed) => report.installed.push(installed),
                Err(failure) => {
                    warn!(name = %failure.name, error = %failure.error, "install failed");
                    report.failures.push(failure);
                }
            }
        }
        report.installed.sort_by(|a, b| a.name.cmp(&b.name));
        report.failures.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }

    /// Install everything declared in the manifest (both groups).
    ///
    /// A missing manifest is a soft no-op reported in `notes`.
    ///
    /// # Errors
    /// Returns an error only if the manifest exists but cannot be loaded.
    pub async fn install_all(&self) -> Result<InstallReport, PkgError> {
        if !self.manifest.exists() {
            warn!(path = %self.manifest.path().display(), "no manifest, nothing to install");
            return Ok(InstallReport {
                notes: vec![format!(
                    "No {} found; nothing to install",
                    display_name(self.manifest.path())
                )],
                ..Default::default()
            });
        }

        let manifest = self.manifest.load()?;
        let mut packages = Vec::new();
        let mut invalid = Vec::new();
        for (name, version, is_dev) in manifest.entries() {
            match PackageRef::from_manifest_entry(&name, &version, is_dev) {
                Ok(pkg) => packages.push(pkg),
                Err(e) => invalid.push(PackageFailure::at(&name, InstallStage::Pending, e)),
            }
        }

        let mut report = self.install_many(packages).await;
        if report.installed.is_empty() && report.failures.is_empty() && invalid.is_empty() {
            report.notes.push("No dependencies to install".to_string());
        }
        report.failures.extend(invalid);
        report.failures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(report)
    }

    /// Uninstall one package.
    ///
    /// The module directory is the authority: if it does not exist nothing is
    /// touched. Otherwise it is removed first, then the name is dropped from
    /// both manifest groups and from the lock file.
    pub async fn uninstall_one(&self, name: &str) -> Result<UninstallOutcome, PkgError> {
        let pkg = PackageRef::parse(name)?;
        let name = pkg.name.as_str();
        let module_dir = self.config.module_dir(name);

        if !module_dir.is_dir() {
            info!(name, "not installed");
            return Ok(UninstallOutcome::NotInstalled);
        }

        let removed = minipm_util::fs::remove_dir_all_if_exists(&module_dir).map_err(|e| {
            PkgError::io(format!("Failed to remove {}: {e}", module_dir.display()))
        })?;
        if !removed {
            info!(name, "not installed");
            return Ok(UninstallOutcome::NotInstalled);
        }
        if pkg.is_scoped() {
            // Drop the @scope directory once its last package is gone
            if let Some(scope_dir) = module_dir.parent() {
                let _ = tokio::fs::remove_dir(scope_dir).await;
            }
        }

        {
            let _guard = self.writer.lock().await;
            let in_manifest = self.manifest.remove(name)?;
            let in_lock = self.lock.remove(name)?;
            debug!(name, in_manifest, in_lock, "pruned metadata");
        }

        info!(name, "uninstalled");
        Ok(UninstallOutcome::Removed)
    }

    /// Uninstall everything declared in the manifest.
    ///
    /// A missing manifest is a soft no-op reported in `notes`.
    ///
    /// # Errors
    /// Returns an error only if the manifest exists but cannot be loaded.
    pub async fn uninstall_all(&self) -> Result<UninstallReport, PkgError> {
        if !self.manifest.exists() {
            warn!(path = %self.manifest.path().display(), "no manifest, nothing to uninstall");
            return Ok(UninstallReport {
                notes: vec![format!(
                    "No {} found; nothing to uninstall",
                    display_name(self.manifest.path())
                )],
                ..Default::default()
            });
        }

        let names: Vec<String> = self
            .manifest
            .load()?
            .entries()
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        let limit = install_limit(names.len(), self.config.concurrency_cap);

        let results: Vec<(String, Result<UninstallOutcome, PkgError>)> = stream::iter(names)
            .map(|name| async move {
                let result = self.uninstall_one(&name).await;
                (name, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = UninstallReport::default();
        for (name, result) in results {
            match result {
                Ok(UninstallOutcome::Removed) => report.removed.push(name),
                Ok(UninstallOutcome::NotInstalled) => report.not_installed.push(name),
                Err(error) => {
                    warn!(%name, %error, "uninstall failed");
                    report.failures.push(PackageFailure {
                        name,
                        stage: None,
                        error,
                    });
                }
            }
        }
        report.removed.sort();
        report.not_installed.sort();
        report.failures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(report)
    }
}

/// Run the blocking extractor off the async workers.
async fn extract_blocking(tarball: PathBuf, target: PathBuf) -> Result<usize, PkgError> {
    tokio::task::spawn_blocking(move || extract_tgz(&tarball, &target))
        .await
        .map_err(|e| PkgError::extract_failed(format!("Extraction task failed: {e}")))?
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
