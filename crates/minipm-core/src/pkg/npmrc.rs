//! `.npmrc` file parser for registry configuration.
//!
//! Parses `.npmrc` files to extract:
//! - `registry=URL` for the default registry
//! - `@scope:registry=URL` directives for routing scoped packages
//!
//! Auth-token lines are ignored.

use crate::error::Error;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use url::Url;

/// Parsed `.npmrc` configuration.
#[derive(Debug, Clone, Default)]
pub struct NpmrcConfig {
    /// Default registry URL (`registry=...`).
    pub registry: Option<Url>,
    /// Scope → registry URL mapping (e.g., `@acme` → `https://npm.acme.dev/`).
    pub scoped_registries: HashMap<String, Url>,
}

/// Parse a single `.npmrc` file's content.
///
/// Ignores comments (`#`, `;`), blank lines and unknown keys.
#[must_use]
pub fn parse_npmrc(content: &str) -> NpmrcConfig {
    let mut config = NpmrcConfig::default();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "registry" {
            if let Some(url) = parse_registry_url(value) {
                config.registry = Some(url);
            }
            continue;
        }

        // @scope:registry=URL
        if key.starts_with('@') {
            if let Some((scope, "registry")) = key.split_once(':') {
                if let Some(url) = parse_registry_url(value) {
                    config.scoped_registries.insert(scope.to_string(), url);
                }
            }
        }
    }

    config
}

/// Parse a registry URL, ensuring a trailing slash for proper joining.
fn parse_registry_url(value: &str) -> Option<Url> {
    let url_str = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    Url::parse(&url_str).ok()
}

/// Load and merge `.npmrc` files from project directory up to home.
///
/// Priority order (first wins, no overwrite):
/// 1. `project_dir/.npmrc`
/// 2. Parent directories up to filesystem root
/// 3. `$HOME/.npmrc`
///
/// # Errors
/// Returns an error if an existing `.npmrc` cannot be read.
pub fn load_npmrc_files(project_dir: &Path) -> Result<NpmrcConfig, Error> {
    let mut merged = NpmrcConfig::default();

    let mut dir = Some(project_dir.to_path_buf());
    while let Some(d) = dir {
        merge_file(&mut merged, &d.join(".npmrc"))?;
        dir = d.parent().map(Path::to_path_buf);
    }

    // Covers a project that is not under HOME
    if let Some(home) = dirs_next::home_dir() {
        merge_file(&mut merged, &home.join(".npmrc"))?;
    }

    Ok(merged)
}

fn merge_file(target: &mut NpmrcConfig, path: &Path) -> Result<(), Error> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            merge_config(target, &parse_npmrc(&content));
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound || path.is_dir() => Ok(()),
        Err(source) => Err(Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Merge `source` into `target`, keeping existing entries (first wins).
fn merge_config(target: &mut NpmrcConfig, source: &NpmrcConfig) {
    if target.registry.is_none() {
        target.registry.clone_from(&source.registry);
    }
    for (scope, url) in &source.scoped_registries {
        target
            .scoped_registries
            .entry(scope.clone())
            .or_insert_with(|| url.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_default_registry() {
        let config = parse_npmrc("registry=https://npm.example.com\n");
        assert_eq!(
            config.registry.unwrap().as_str(),
            "https://npm.example.com/"
        );
    }

    #[test]
    fn test_parse_scoped_registry() {
        let content = "@acme:registry=https://npm.acme.dev/\n";
        let config = parse_npmrc(content);
        assert_eq!(config.scoped_registries.len(), 1);
        assert_eq!(
            config.scoped_registries["@acme"].as_str(),
            "https://npm.acme.dev/"
        );
    }

    #[test]
    fn test_auth_lines_ignored() {
        let content = "\
# private
@acme:registry=https://npm.acme.dev/
//npm.acme.dev/:_authToken=secret

; public
registry=https://registry.npmjs.org/
";
        let config = parse_npmrc(content);
        assert_eq!(config.scoped_registries.len(), 1);
        assert!(config.registry.is_some());
    }

    #[test]
    fn test_invalid_url_skipped() {
        let config = parse_npmrc("registry=not a url\n");
        assert!(config.registry.is_none());
    }

    #[test]
    fn test_merge_first_wins() {
        let mut target = parse_npmrc("registry=https://first.com/\n");
        let source = parse_npmrc("registry=https://second.com/\n@s:registry=https://s.com/\n");

        merge_config(&mut target, &source);
        assert_eq!(target.registry.unwrap().as_str(), "https://first.com/");
        assert_eq!(target.scoped_registries["@s"].as_str(), "https://s.com/");
    }

    #[test]
    fn test_load_from_project_dir() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("app");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join(".npmrc"), "registry=http://127.0.0.1:4873\n").unwrap();
        std::fs::write(
            dir.path().join(".npmrc"),
            "registry=http://parent.invalid/\n@acme:registry=http://acme.invalid/\n",
        )
        .unwrap();

        let config = load_npmrc_files(&project).unwrap();
        assert_eq!(
            config.registry.unwrap().as_str(),
            "http://127.0.0.1:4873/"
        );
        assert!(config.scoped_registries.contains_key("@acme"));
    }
}
