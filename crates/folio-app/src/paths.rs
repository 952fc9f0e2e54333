//! Filesystem path helpers (XDG-aware) for blob storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("unable to determine project directories")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid blob key `{key}`")]
    InvalidBlobKey { key: String },
}

/// Container providing filesystem paths for the application. In production this
/// is rooted at `$XDG_DATA_HOME/folio`; tests may construct custom instances.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under `$XDG_DATA_HOME/folio`.
    pub fn from_project_dirs() -> Result<Self, PathError> {
        let dirs =
            ProjectDirs::from("dev", "folio", "folio").ok_or(PathError::MissingProjectDirs)?;
        Self::new(dirs.data_dir())
    }

    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// Base data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }

    /// Base directory for blob storage (`.../blobs`).
    pub fn blobs_base_dir(&self) -> Result<PathBuf, PathError> {
        let path = self.base_dir.join("blobs");
        ensure_dir(&path)
    }

    /// Full path for a blob key of the form `{context}/{hash}{ext}`.
    ///
    /// Keys are slash-separated relative paths; absolute segments and `..` are
    /// rejected so callers cannot escape the blob root.
    pub fn blob_path(&self, key: &str) -> Result<PathBuf, PathError> {
        validate_blob_key(key)?;
        let mut path = self.blobs_base_dir()?;
        for segment in key.split('/') {
            path.push(segment);
        }
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        Ok(path)
    }
}

pub fn validate_blob_key(key: &str) -> Result<(), PathError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.split('/').any(|s| s.is_empty() || s == "." || s == "..");
    if invalid {
        return Err(PathError::InvalidBlobKey {
            key: key.to_owned(),
        });
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(PathError::CreateDir {
                path: path.to_path_buf(),
                source: err,
            });
        }
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_path_nests_under_blobs_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path()).expect("paths");
        let path = paths
            .blob_path("ctx_0a1b2c3d/deadbeef.pdf")
            .expect("blob path");
        assert!(path.starts_with(dir.path().join("blobs").join("ctx_0a1b2c3d")));
        assert!(path.ends_with("deadbeef.pdf"));
    }

    #[test]
    fn blob_path_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path()).expect("paths");
        assert!(paths.blob_path("../escape").is_err());
        assert!(paths.blob_path("/absolute").is_err());
        assert!(paths.blob_path("a//b").is_err());
        assert!(paths.blob_path("").is_err());
    }
}
