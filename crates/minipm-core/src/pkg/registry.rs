//! npm registry client.

use super::error::PkgError;
use super::npmrc::load_npmrc_files;
use super::spec::url_encoded_name;
use crate::config::Config;
use crate::version::USER_AGENT;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Tarball download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Package metadata document (`GET <registry>/<name>`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionDoc>,
}

impl Packument {
    /// Version the `latest` dist-tag points to.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }

    /// Per-version document for an exact version.
    #[must_use]
    pub fn version(&self, version: &str) -> Option<&VersionDoc> {
        self.versions.get(version)
    }
}

/// Metadata for one published version
/// (an entry of `versions`, or `GET <registry>/<name>/<version>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub dist: Dist,
}

/// Distribution info of a published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    pub tarball: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl Dist {
    /// Digest recorded in the lock file: `shasum`, else `integrity`, else empty.
    ///
    /// Copied verbatim; never verified.
    #[must_use]
    pub fn digest(&self) -> &str {
        self.shasum
            .as_deref()
            .or(self.integrity.as_deref())
            .unwrap_or_default()
    }
}

/// Registry client for fetching package metadata and tarballs.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    scoped: HashMap<String, Url>,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            scoped: HashMap::new(),
            http,
        })
    }

    /// Create a client from the project configuration.
    ///
    /// Applies the registry precedence of [`Config::effective_registry`] and
    /// picks up `@scope:registry=` routing from `.npmrc`.
    ///
    /// # Errors
    /// Returns an error if an `.npmrc` cannot be read or the URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self, PkgError> {
        let npmrc = load_npmrc_files(&config.root)?;
        let client = Self::new(&config.effective_registry(&npmrc))?;
        Ok(client.with_scoped_registries(npmrc.scoped_registries))
    }

    /// Route scoped packages (`@scope/...`) to dedicated registries.
    #[must_use]
    pub fn with_scoped_registries(mut self, scoped: HashMap<String, Url>) -> Self {
        self.scoped = scoped;
        self
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Registry that serves a given package name.
    #[must_use]
    pub fn registry_for(&self, name: &str) -> &Url {
        name.split_once('/')
            .filter(|(scope, _)| scope.starts_with('@'))
            .and_then(|(scope, _)| self.scoped.get(scope))
            .unwrap_or(&self.base_url)
    }

    /// Fetch the packument (package metadata) for a package.
    ///
    /// # Errors
    /// `PKG_NOT_FOUND` on 404, `PKG_REGISTRY_ERROR` on any other failure.
    pub async fn fetch_metadata(&self, name: &str) -> Result<Packument, PkgError> {
        let url = self.url_for(name, &url_encoded_name(name))?;
        trace!(%url, "GET packument");

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }
        let response = ensure_success(response, name)?;

        let mut packument: Packument = response.json().await?;
        if packument.name.is_empty() {
            packument.name = name.to_string();
        }
        Ok(packument)
    }

    /// Fetch the document of one exact version.
    ///
    /// # Errors
    /// `PKG_VERSION_NOT_FOUND` on 404, `PKG_REGISTRY_ERROR` on any other failure.
    pub async fn fetch_version(&self, name: &str, version: &str) -> Result<VersionDoc, PkgError> {
        let path = format!("{}/{version}", url_encoded_name(name));
        let url = self.url_for(name, &path)?;
        trace!(%url, "GET version document");

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PkgError::version_not_found(name, version));
        }
        let response = ensure_success(response, name)?;

        let mut doc: VersionDoc = response.json().await?;
        if doc.version.is_empty() {
            doc.version = version.to_string();
        }
        if doc.name.is_empty() {
            doc.name = name.to_string();
        }
        Ok(doc)
    }

    /// Start a tarball download. The body is consumed by the caller.
    ///
    /// # Errors
    /// `PKG_DOWNLOAD_FAILED` if the request fails or returns a non-2xx status.
    pub async fn fetch_tarball(&self, url: &str) -> Result<Response, PkgError> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

        if !response.status().is_success() {
            return Err(PkgError::download_failed(format!(
                "Download failed with status {} for '{url}'",
                response.status()
            )));
        }

        Ok(response)
    }

    fn url_for(&self, name: &str, path: &str) -> Result<Url, PkgError> {
        self.registry_for(name)
            .join(path)
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
    }
}

fn ensure_success(response: Response, name: &str) -> Result<Response, PkgError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(PkgError::registry(format!(
            "Registry returned status {} for '{name}'",
            response.status()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packument() -> Packument {
        serde_json::from_value(serde_json::json!({
            "name": "left-pad",
            "dist-tags": { "latest": "1.3.0", "next": "2.0.0-rc.1" },
            "versions": {
                "1.3.0": {
                    "name": "left-pad",
                    "version": "1.3.0",
                    "dist": {
                        "tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
                        "shasum": "5b8a3a7765dfe001261dde915589e782f8c94d1e"
                    }
                },
                "1.1.0": {
                    "dist": { "tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.1.0.tgz" }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_packument_latest() {
        assert_eq!(packument().latest(), Some("1.3.0"));
    }

    #[test]
    fn test_packument_version_lookup() {
        let p = packument();
        let doc = p.version("1.3.0").unwrap();
        assert_eq!(
            doc.dist.tarball,
            "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz"
        );
        assert!(p.version("9.9.9").is_none());
    }

    #[test]
    fn test_dist_digest_fallbacks() {
        let p = packument();
        assert_eq!(
            p.version("1.3.0").unwrap().dist.digest(),
            "5b8a3a7765dfe001261dde915589e782f8c94d1e"
        );
        assert_eq!(p.version("1.1.0").unwrap().dist.digest(), "");

        let dist = Dist {
            tarball: String::new(),
            shasum: None,
            integrity: Some("sha512-abc".into()),
        };
        assert_eq!(dist.digest(), "sha512-abc");
    }

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new("https://registry.npmjs.org/");
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_invalid_url() {
        let client = RegistryClient::new("not-a-url");
        assert!(client.is_err());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = RegistryClient::new("http://127.0.0.1:4873/npm").unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:4873/npm/");
        let url = client.url_for("left-pad", "left-pad").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4873/npm/left-pad");
    }

    #[test]
    fn test_scoped_routing() {
        let mut scoped = HashMap::new();
        scoped.insert(
            "@acme".to_string(),
            Url::parse("https://npm.acme.dev/").unwrap(),
        );
        let client = RegistryClient::new("https://registry.npmjs.org/")
            .unwrap()
            .with_scoped_registries(scoped);

        assert_eq!(
            client.registry_for("@acme/widgets").as_str(),
            "https://npm.acme.dev/"
        );
        assert_eq!(
            client.registry_for("@other/widgets").as_str(),
            "https://registry.npmjs.org/"
        );
        assert_eq!(
            client.registry_for("left-pad").as_str(),
            "https://registry.npmjs.org/"
        );
    }

    #[test]
    fn test_scoped_url_encoding() {
        let client = RegistryClient::new("https://registry.npmjs.org/").unwrap();
        let url = client
            .url_for("@types/node", &url_encoded_name("@types/node"))
            .unwrap();
        assert_eq!(url.as_str(), "https://registry.npmjs.org/@types%2Fnode");
    }
}
