use crate::error::Error;
use crate::pkg::npmrc::NpmrcConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override the registry URL.
pub const REGISTRY_ENV: &str = "MINIPM_REGISTRY";

/// Manifest filename inside the project root.
pub const MANIFEST_NAME: &str = "package.json";

/// Lock filename inside the project root.
pub const LOCKFILE_NAME: &str = "minipm-lock.json";

/// Default name of the modules root directory.
pub const DEFAULT_MODULES_DIR: &str = "modules";

/// Default upper bound for concurrent install pipelines.
pub const DEFAULT_CONCURRENCY_CAP: usize = 8;

/// Runtime configuration shared by every minipm component.
///
/// The project root is always explicit; nothing is derived from the location
/// of the running executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project root (holds the manifest, lock file and modules root).
    pub root: PathBuf,

    /// Name of the modules root directory under `root`.
    pub modules_dir: String,

    /// Registry URL override (takes precedence over env and `.npmrc`).
    pub registry: Option<String>,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Upper bound for the dynamic install concurrency limit.
    pub concurrency_cap: usize,
}

impl Config {
    /// Create a new config rooted at the given project directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            modules_dir: DEFAULT_MODULES_DIR.to_string(),
            registry: None,
            json_logs: false,
            verbosity: 0,
            concurrency_cap: DEFAULT_CONCURRENCY_CAP,
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set the registry URL override.
    #[must_use]
    pub fn with_registry(mut self, registry: Option<String>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the modules root directory name.
    #[must_use]
    pub fn with_modules_dir(mut self, modules_dir: impl Into<String>) -> Self {
        self.modules_dir = modules_dir.into();
        self
    }

    /// Set the concurrency cap (values below 1 are treated as 1).
    #[must_use]
    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.concurrency_cap = cap.max(1);
        self
    }

    /// Check that the project root exists and is a directory.
    pub fn validate(&self) -> Result<(), Error> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::RootInvalid {
                path: self.root.clone(),
            })
        }
    }

    /// Path of the dependency manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_NAME)
    }

    /// Path of the lock file.
    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(LOCKFILE_NAME)
    }

    /// Root directory holding one subdirectory per installed package.
    #[must_use]
    pub fn modules_root(&self) -> PathBuf {
        self.root.join(&self.modules_dir)
    }

    /// Module directory for a package.
    ///
    /// Scoped names nest: `@scope/name` -> `<modules>/@scope/name`.
    #[must_use]
    pub fn module_dir(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.modules_root(), |dir, part| dir.join(part))
    }

    /// Default project name used for fresh manifests: the root directory name.
    #[must_use]
    pub fn default_project_name(&self) -> String {
        project_name_for(&self.root)
    }

    /// Registry URL to use, in precedence order:
    /// explicit override, `MINIPM_REGISTRY`, `.npmrc` `registry=`, npm default.
    #[must_use]
    pub fn effective_registry(&self, npmrc: &NpmrcConfig) -> String {
        if let Some(url) = &self.registry {
            return url.clone();
        }
        if let Ok(url) = std::env::var(REGISTRY_ENV) {
            if !url.trim().is_empty() {
                return url;
            }
        }
        if let Some(url) = &npmrc.registry {
            return url.to_string();
        }
        DEFAULT_REGISTRY.to_string()
    }
}

fn project_name_for(root: &Path) -> String {
    // "." and ".." have no file name until resolved
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    root.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("my-project")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use url::Url;

    #[test]
    fn test_derived_paths() {
        let config = Config::new(PathBuf::from("/work/app"));
        assert_eq!(config.manifest_path(), PathBuf::from("/work/app/package.json"));
        assert_eq!(
            config.lockfile_path(),
            PathBuf::from("/work/app/minipm-lock.json")
        );
        assert_eq!(config.modules_root(), PathBuf::from("/work/app/modules"));
        assert_eq!(
            config.module_dir("left-pad"),
            PathBuf::from("/work/app/modules/left-pad")
        );
    }

    #[test]
    fn test_module_dir_scoped() {
        let config = Config::new(PathBuf::from("/work/app")).with_modules_dir("deps");
        assert_eq!(
            config.module_dir("@types/node"),
            PathBuf::from("/work/app/deps/@types/node")
        );
    }

    #[test]
    fn test_concurrency_cap_floor() {
        let config = Config::new(PathBuf::from("/x")).with_concurrency_cap(0);
        assert_eq!(config.concurrency_cap, 1);
    }

    #[test]
    fn test_default_project_name() {
        let config = Config::new(PathBuf::from("/work/my-app"));
        assert_eq!(config.default_project_name(), "my-app");
        let config = Config::new(PathBuf::from("/"));
        assert_eq!(config.default_project_name(), "my-project");
    }

    #[test]
    fn test_default_project_name_relative_root() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("web-app");
        std::fs::create_dir(&app).unwrap();

        std::fs::create_dir(app.join("lib")).unwrap();

        let config = Config::new(app.join("lib").join(".."));
        assert_eq!(config.default_project_name(), "web-app");

        let cwd = std::env::current_dir().unwrap();
        let expected = cwd.file_name().unwrap().to_str().unwrap();
        let config = Config::new(PathBuf::from("."));
        assert_eq!(config.default_project_name(), expected);
    }

    #[test]
    fn test_validate_missing_root() {
        let config = Config::new(PathBuf::from("/definitely/not/here/minipm"));
        assert!(matches!(config.validate(), Err(Error::RootInvalid { .. })));
    }

    #[test]
    #[serial]
    fn test_registry_override_wins() {
        std::env::set_var(REGISTRY_ENV, "http://env.example/");
        let config =
            Config::new(PathBuf::from("/x")).with_registry(Some("http://flag.example/".into()));
        assert_eq!(
            config.effective_registry(&NpmrcConfig::default()),
            "http://flag.example/"
        );
        std::env::remove_var(REGISTRY_ENV);
    }

    #[test]
    #[serial]
    fn test_registry_env_before_npmrc() {
        std::env::set_var(REGISTRY_ENV, "http://env.example/");
        let npmrc = NpmrcConfig {
            registry: Some(Url::parse("http://rc.example/").unwrap()),
            ..Default::default()
        };
        let config = Config::new(PathBuf::from("/x"));
        assert_eq!(config.effective_registry(&npmrc), "http://env.example/");
        std::env::remove_var(REGISTRY_ENV);
    }

    #[test]
    #[serial]
    fn test_registry_npmrc_then_default() {
        std::env::remove_var(REGISTRY_ENV);
        let config = Config::new(PathBuf::from("/x"));
        let npmrc = NpmrcConfig {
            registry: Some(Url::parse("http://rc.example/").unwrap()),
            ..Default::default()
        };
        assert_eq!(config.effective_registry(&npmrc), "http://rc.example/");
        assert_eq!(
            config.effective_registry(&NpmrcConfig::default()),
            DEFAULT_REGISTRY
        );
    }
}
