//! Blob storage: key-addressed bytes with small per-object metadata.
//!
//! Keys have the form `{context}/{hash}{ext}`, so deleting a context is a
//! prefix listing plus per-key deletes.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::paths::{AppPaths, PathError, validate_blob_key};

/// String metadata attached to a blob, for example `file_id` and `context_id`.
pub type BlobMetadata = HashMap<String, String>;

/// Compute the content hash used in blob keys (BLAKE3 lowercase hex).
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Errors emitted by blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidKey(#[from] PathError),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BlobError {
    fn from(e: std::io::Error) -> Self {
        BlobError::Io(e.to_string())
    }
}

/// Trait abstracting over blob storage backends.
///
/// `put` is an overwrite: writing the same key replaces bytes and metadata.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, metadata: BlobMetadata) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Bytes, BlobError>;

    /// Delete the blob if present. Returns Ok(true) if deleted, Ok(false) if
    /// it did not exist.
    async fn delete(&self, key: &str) -> Result<bool, BlobError>;

    /// Keys under the given prefix, lexicographically sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;

    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>, BlobError>;
}

/// Durability policy for filesystem writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableWrite {
    /// No explicit fsync (fastest, least durable).
    None,
    /// Fsync the data file before rename.
    FileOnly,
}

/// Filesystem blob store rooted at `AppPaths::blobs_base_dir`.
///
/// Write strategy: stream to a temp file in the data dir, then atomically
/// rename into place. Metadata lives in a JSON sidecar next to the blob.
#[derive(Debug, Clone, bon::Builder)]
pub struct FsBlobStore {
    paths: AppPaths,
    #[builder(default = DurableWrite::None)]
    durability: DurableWrite,
}

impl FsBlobStore {
    fn meta_path(&self, key: &str) -> Result<std::path::PathBuf, BlobError> {
        let mut path = self.paths.blob_path(key)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.set_file_name(format!("{file_name}.meta.json"));
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes, metadata: BlobMetadata) -> Result<(), BlobError> {
        let final_path = self.paths.blob_path(key)?;

        let temp = tempfile::NamedTempFile::new_in(self.paths.data_dir())
            .map_err(|e| BlobError::Io(format!("create temp file: {e}")))?;
        let temp_path = temp.path().to_path_buf();
        let mut file = fs::File::from_std(
            temp.reopen()
                .map_err(|e| BlobError::Io(format!("reopen temp file: {e}")))?,
        );
        file.write_all(&data)
            .await
            .map_err(|e| BlobError::Io(format!("write blob: {e}")))?;
        if self.durability == DurableWrite::FileOnly {
            file.sync_all()
                .await
                .map_err(|e| BlobError::Io(format!("fsync blob: {e}")))?;
        }
        drop(file);

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| BlobError::Io(format!("finalize blob: {e}")))?;
        // NamedTempFile would unlink the moved file on drop.
        let _ = temp.into_temp_path().keep();

        let meta_json = serde_json::to_vec(&metadata)
            .map_err(|e| BlobError::Io(format!("encode metadata: {e}")))?;
        fs::write(self.meta_path(key)?, meta_json)
            .await
            .map_err(|e| BlobError::Io(format!("write metadata: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobError> {
        let path = self.paths.blob_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::Io(format!("read blob: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.paths.blob_path(key)?;
        let _ = fs::remove_file(self.meta_path(key)?).await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::Io(format!("delete blob: {e}"))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        validate_blob_key(prefix)?;
        let base = self
            .paths
            .blobs_base_dir()
            .map_err(BlobError::InvalidKey)?;
        let mut keys = Vec::new();
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BlobError::Io(format!("list blobs: {e}"))),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| BlobError::Io(format!("list blobs: {e}")))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&base) else {
                    continue;
                };
                let key = rel.to_string_lossy().replace('\\', "/");
                if key.ends_with(".meta.json") {
                    continue;
                }
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>, BlobError> {
        match fs::read(self.meta_path(key)?).await {
            Ok(bytes) => {
                let metadata = serde_json::from_slice(&bytes)
                    .map_err(|e| BlobError::Io(format!("decode metadata: {e}")))?;
                Ok(Some(metadata))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobError::Io(format!("read metadata: {e}"))),
        }
    }
}

/// In-memory blob store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    map: tokio::sync::Mutex<HashMap<String, (Bytes, BlobMetadata)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, metadata: BlobMetadata) -> Result<(), BlobError> {
        validate_blob_key(key)?;
        self.map
            .lock()
            .await
            .insert(key.to_string(), (data, metadata));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobError> {
        self.map
            .lock()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.map.lock().await.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let map = self.map.lock().await;
        let mut keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>, BlobError> {
        Ok(self
            .map
            .lock()
            .await
            .get(key)
            .map(|(_, meta)| meta.clone()))
    }
}
