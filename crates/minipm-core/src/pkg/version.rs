//! Version resolution against a packument.
//!
//! Only exact versions and dist-tags are supported; semver ranges are not.

use super::error::PkgError;
use super::registry::Packument;
use super::spec::LATEST;

/// Resolve a requested version token to a concrete published version.
///
/// # Rules
/// - `"latest"` or an empty token resolves to `dist-tags.latest`
/// - any other dist-tag name resolves to the version it points to
/// - anything else must be an exact key of `versions`
///
/// The resolved version is always present in `versions`.
///
/// # Errors
/// Returns `PKG_VERSION_NOT_FOUND` if nothing matches.
pub fn resolve_version(packument: &Packument, requested: &str) -> Result<String, PkgError> {
    let name = packument.name.as_str();
    let requested = requested.trim();

    let candidate = if requested.is_empty() || requested == LATEST {
        packument.latest().ok_or_else(|| {
            PkgError::version_not_found(name, "latest (no dist-tags.latest found)")
        })?
    } else if let Some(tagged) = packument.dist_tags.get(requested) {
        tagged.as_str()
    } else {
        requested
    };

    if packument.versions.contains_key(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(PkgError::version_not_found(name, candidate))
    }
}

/// Whether a resolved version is safe to use in a file name.
#[must_use]
pub fn is_safe_version(version: &str) -> bool {
    !version.is_empty()
        && version != "."
        && version != ".."
        && !version.contains(['/', '\\'])
        && !version.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;

    fn packument() -> Packument {
        serde_json::from_value(serde_json::json!({
            "name": "left-pad",
            "dist-tags": { "latest": "1.3.0", "beta": "2.0.0-beta.1", "stale": "0.0.1" },
            "versions": {
                "1.3.0": { "dist": { "tarball": "t1" } },
                "1.2.0": { "dist": { "tarball": "t2" } },
                "2.0.0-beta.1": { "dist": { "tarball": "t3" } }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_latest_and_empty() {
        let p = packument();
        assert_eq!(resolve_version(&p, "latest").unwrap(), "1.3.0");
        assert_eq!(resolve_version(&p, "").unwrap(), "1.3.0");
        assert_eq!(resolve_version(&p, "  ").unwrap(), "1.3.0");
    }

    #[test]
    fn test_exact_version() {
        let p = packument();
        assert_eq!(resolve_version(&p, "1.2.0").unwrap(), "1.2.0");
    }

    #[test]
    fn test_other_dist_tag() {
        let p = packument();
        assert_eq!(resolve_version(&p, "beta").unwrap(), "2.0.0-beta.1");
    }

    #[test]
    fn test_missing_version() {
        let err = resolve_version(&packument(), "9.9.9").unwrap_err();
        assert_eq!(err.code(), codes::PKG_VERSION_NOT_FOUND);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ranges_not_supported() {
        let err = resolve_version(&packument(), "^1.0.0").unwrap_err();
        assert_eq!(err.code(), codes::PKG_VERSION_NOT_FOUND);
    }

    #[test]
    fn test_tag_pointing_nowhere() {
        let err = resolve_version(&packument(), "stale").unwrap_err();
        assert_eq!(err.code(), codes::PKG_VERSION_NOT_FOUND);
    }

    #[test]
    fn test_no_latest_tag() {
        let p: Packument = serde_json::from_value(serde_json::json!({
            "name": "x",
            "versions": { "1.0.0": { "dist": { "tarball": "t" } } }
        }))
        .unwrap();
        assert!(resolve_version(&p, "latest").is_err());
    }

    #[test]
    fn test_is_safe_version() {
        assert!(is_safe_version("1.3.0"));
        assert!(is_safe_version("2.0.0-beta.1+build.5"));
        assert!(!is_safe_version(""));
        assert!(!is_safe_version(".."));
        assert!(!is_safe_version("../1.0.0"));
        assert!(!is_safe_version("1.0 .0"));
    }
}
