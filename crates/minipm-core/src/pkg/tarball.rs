//! Tarball download and extraction.

use super::error::PkgError;
use flate2::read::GzDecoder;
use reqwest::Response;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tokio::io::AsyncWriteExt;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Stream a tarball response body into a file.
///
/// The body is written chunk by chunk and never held in memory as a whole.
/// On any failure the partially written file is removed.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_to_file(
    response: Response,
    dest: &Path,
    max_bytes: u64,
) -> Result<u64, PkgError> {
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::download_failed(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let result = stream_body(response, dest, max_bytes).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

async fn stream_body(mut response: Response, dest: &Path, max_bytes: u64) -> Result<u64, PkgError> {
    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        PkgError::io(format!("Failed to create '{}': {e}", dest.display()))
    })?;

    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to read response body: {e}")))?
    {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(PkgError::download_failed(format!(
                "Tarball too large: more than {max_bytes} bytes"
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Extract a gzipped tarball into `target_dir`.
///
/// Exactly one leading path component (the wrapper directory, usually
/// `package/`) is stripped from every entry, so files land directly under
/// `target_dir`. Existing files with colliding names are overwritten; other
/// existing files are left alone. Symlinks and special entries are skipped.
///
/// Returns the number of files written.
///
/// # Errors
/// Returns `PKG_EXTRACT_FAILED` if the archive is corrupt or contains unsafe
/// paths; files extracted before the failure are not removed.
pub fn extract_tgz(tarball_path: &Path, target_dir: &Path) -> Result<usize, PkgError> {
    let file = File::open(tarball_path).map_err(|e| {
        PkgError::extract_failed(format!(
            "Failed to open tarball '{}': {e}",
            tarball_path.display()
        ))
    })?;
    fs::create_dir_all(target_dir)?;

    let mut archive = Archive::new(GzDecoder::new(io::BufReader::new(file)));
    let mut files = 0usize;

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(relative) = strip_wrapper(&path)? else {
            // The wrapper directory itself
            continue;
        };

        let dest_path = target_dir.join(&relative);
        if !dest_path.starts_with(target_dir) {
            return Err(PkgError::extract_failed(format!(
                "Tarball entry escapes destination: {}",
                path.display()
            )));
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest_path)?;
            io::copy(&mut entry, &mut out).map_err(|e| {
                PkgError::extract_failed(format!(
                    "Failed to extract '{}': {e}",
                    relative.display()
                ))
            })?;
            files += 1;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let perms = fs::Permissions::from_mode(mode & 0o777);
                    let _ = fs::set_permissions(&dest_path, perms);
                }
            }
        }
        // Symlinks, hard links and device entries are skipped
    }

    Ok(files)
}

/// Validate an entry path and drop its first component.
///
/// Returns `Ok(None)` for the wrapper directory entry itself.
fn strip_wrapper(path: &Path) -> Result<Option<PathBuf>, PkgError> {
    if path.is_absolute() {
        return Err(PkgError::extract_failed(format!(
            "Tarball contains absolute path: {}",
            path.display()
        )));
    }

    let mut rest = PathBuf::new();
    let mut skipped_wrapper = false;
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if skipped_wrapper {
                    rest.push(part);
                } else {
                    skipped_wrapper = true;
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "Tarball contains path traversal: {}",
                    path.display()
                )));
            }
        }
    }

    Ok(if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tar::Builder;
    use tempfile::tempdir;

    fn gzip(tar_bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn append_file(builder: &mut Builder<&mut Vec<u8>>, path: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn create_test_tarball(prefix: &str) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            append_file(
                &mut builder,
                &format!("{prefix}/package.json"),
                br#"{"name":"test","version":"1.0.0"}"#,
            );
            append_file(
                &mut builder,
                &format!("{prefix}/lib/index.js"),
                b"module.exports = 42;",
            );
            builder.finish().unwrap();
        }
        gzip(&tar_bytes)
    }

    fn write_tgz(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("test-1.0.0.tgz");
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_extract_strips_wrapper() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("modules").join("test");
        let tgz = write_tgz(dir.path(), &create_test_tarball("package"));

        let files = extract_tgz(&tgz, &target).unwrap();

        assert_eq!(files, 2);
        assert!(target.join("package.json").exists());
        assert!(target.join("lib").join("index.js").exists());
        assert!(!target.join("package").exists());
    }

    #[test]
    fn test_non_package_prefix() {
        // Some packages (e.g., @types/*) use the bare package name as wrapper
        let dir = tempdir().unwrap();
        let target = dir.path().join("node");
        let tgz = write_tgz(dir.path(), &create_test_tarball("node"));

        extract_tgz(&tgz, &target).unwrap();
        assert!(target.join("package.json").exists());
    }

    #[test]
    fn test_extract_keeps_stale_files() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("test");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("OLD.md"), "stale").unwrap();
        fs::write(target.join("package.json"), "{}").unwrap();

        let tgz = write_tgz(dir.path(), &create_test_tarball("package"));
        extract_tgz(&tgz, &target).unwrap();

        assert!(target.join("OLD.md").exists());
        let pkg_json = fs::read_to_string(target.join("package.json")).unwrap();
        assert!(pkg_json.contains("\"test\""));
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempdir().unwrap();
        let tgz = write_tgz(dir.path(), b"definitely not gzip");

        let err = extract_tgz(&tgz, &dir.path().join("out")).unwrap_err();
        assert_eq!(err.code(), codes::PKG_EXTRACT_FAILED);
        // Tarball is left in place for diagnosis
        assert!(tgz.exists());
    }

    #[test]
    fn test_reject_path_traversal() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            let data = b"evil";
            let mut header = tar::Header::new_gnu();
            // set_path refuses "..", so write the raw name bytes
            let name = b"package/../../evil.txt";
            header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        let tgz = write_tgz(dir.path(), &gzip(&tar_bytes));

        let err = extract_tgz(&tgz, &target).unwrap_err();
        assert_eq!(err.code(), codes::PKG_EXTRACT_FAILED);
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_strip_wrapper() {
        assert_eq!(strip_wrapper(Path::new("package")).unwrap(), None);
        assert_eq!(strip_wrapper(Path::new("package/")).unwrap(), None);
        assert_eq!(
            strip_wrapper(Path::new("package/a/b.js")).unwrap(),
            Some(PathBuf::from("a/b.js"))
        );
        assert_eq!(
            strip_wrapper(Path::new("./package/index.js")).unwrap(),
            Some(PathBuf::from("index.js"))
        );
        assert!(strip_wrapper(Path::new("/etc/passwd")).is_err());
        assert!(strip_wrapper(Path::new("package/../x")).is_err());
    }
}
