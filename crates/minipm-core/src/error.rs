use std::path::PathBuf;
use thiserror::Error;

/// Core error type for configuration and project-level failures.
///
/// Per-package failures use [`crate::pkg::PkgError`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Project root is not a directory: {path}")]
    RootInvalid { path: PathBuf },
}
