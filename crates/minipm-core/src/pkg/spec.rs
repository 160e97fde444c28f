//! Package reference parsing.
//!
//! Parses package references like:
//! - `left-pad`
//! - `left-pad@1.3.0`
//! - `left-pad@latest`
//! - `@types/node`
//! - `@types/node@20.0.0`

use super::error::PkgError;

/// Version token meaning "whatever the registry tags as latest".
pub const LATEST: &str = "latest";

/// Identity of one dependency for a single install/uninstall operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Scope without the @ prefix, if scoped.
    pub scope: Option<String>,
    /// Requested version token (None means latest).
    pub version: Option<String>,
    /// Whether the package belongs to the dev-dependency group.
    pub is_dev: bool,
}

impl PackageRef {
    /// Parse a package reference string (`name` or `name@version`).
    ///
    /// # Errors
    /// Returns an error if the reference is invalid.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        if input.starts_with('@') {
            Self::parse_scoped(input)
        } else {
            Self::parse_unscoped(input)
        }
    }

    /// Build a reference from a manifest entry (`name` -> `version`).
    ///
    /// # Errors
    /// Returns an error if the name is invalid.
    pub fn from_manifest_entry(name: &str, version: &str, is_dev: bool) -> Result<Self, PkgError> {
        let mut parsed = Self::parse(name)?;
        if parsed.version.is_some() {
            return Err(PkgError::spec_invalid(format!(
                "Manifest key '{name}' must be a bare package name"
            )));
        }
        parsed.version = normalize_version(version);
        parsed.is_dev = is_dev;
        Ok(parsed)
    }

    /// Override the requested version. Empty strings mean latest.
    #[must_use]
    pub fn with_version(mut self, version: Option<&str>) -> Self {
        if let Some(v) = version {
            self.version = normalize_version(v);
        }
        self
    }

    /// Mark the reference as a dev dependency.
    #[must_use]
    pub fn with_dev(mut self, is_dev: bool) -> Self {
        self.is_dev = is_dev;
        self
    }

    /// The requested version token, `"latest"` when none was given.
    #[must_use]
    pub fn requested_version(&self) -> &str {
        self.version.as_deref().unwrap_or(LATEST)
    }

    /// Whether the registry's latest tag should be used.
    #[must_use]
    pub fn wants_latest(&self) -> bool {
        self.requested_version() == LATEST
    }

    fn parse_scoped(input: &str) -> Result<Self, PkgError> {
        let Some(slash_pos) = input.find('/') else {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{input}'"
            )));
        };

        if slash_pos == 1 {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{input}'"
            )));
        }

        let scope = &input[1..slash_pos];
        let after_slash = &input[slash_pos + 1..];

        let (pkg_name, version) = match after_slash.find('@') {
            Some(at_pos) => (&after_slash[..at_pos], Some(&after_slash[at_pos + 1..])),
            None => (after_slash, None),
        };

        if pkg_name.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty name in '{input}'"
            )));
        }
        if version == Some("") {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty version in '{input}'"
            )));
        }

        Self::validate_part(scope, input)?;
        Self::validate_part(pkg_name, input)?;

        Ok(Self {
            name: format!("@{scope}/{pkg_name}"),
            scope: Some(scope.to_string()),
            version: version.and_then(normalize_version),
            is_dev: false,
        })
    }

    fn parse_unscoped(input: &str) -> Result<Self, PkgError> {
        let (name, version) = match input.find('@') {
            Some(at_pos) => (&input[..at_pos], Some(&input[at_pos + 1..])),
            None => (input, None),
        };

        if name.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty name in '{input}'"
            )));
        }
        if version == Some("") {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty version in '{input}'"
            )));
        }

        Self::validate_part(name, input)?;

        Ok(Self {
            name: name.to_string(),
            scope: None,
            version: version.and_then(normalize_version),
            is_dev: false,
        })
    }

    /// Validate one path-forming part of a name (scope or bare name).
    ///
    /// Names become directory names under the modules root, so anything that
    /// could escape it (`..`, leading `.`, separators) is rejected.
    fn validate_part(part: &str, input: &str) -> Result<(), PkgError> {
        if part.starts_with('.') || part.starts_with('_') {
            return Err(PkgError::spec_invalid(format!(
                "Package name cannot start with '.' or '_': '{input}'"
            )));
        }

        for c in part.chars() {
            if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid character '{c}' in package name '{input}'"
                )));
            }
        }

        Ok(())
    }

    /// Check if this is a scoped package.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }

    /// Get the unscoped portion of the name.
    ///
    /// For `@scope/name`, returns `name`.
    /// For `react`, returns `react`.
    #[must_use]
    pub fn unscoped_name(&self) -> &str {
        if let Some(ref scope) = self.scope {
            &self.name[scope.len() + 2..]
        } else {
            &self.name
        }
    }

    /// File name of the temporary tarball for a resolved version.
    #[must_use]
    pub fn tarball_file_name(&self, version: &str) -> String {
        format!("{}-{version}.tgz", self.unscoped_name())
    }
}

/// Blank tokens collapse to `None` (latest).
fn normalize_version(version: &str) -> Option<String> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// URL-encode a package name for registry requests.
///
/// For scoped packages, encodes the `/` as `%2F`.
#[must_use]
pub fn url_encoded_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}
