//! Context and file lifecycle: create, inspect, add, delete.
//!
//! Uploads land in blob storage before any record is committed; if the
//! record batch fails, the just-uploaded blobs are rolled back so storage
//! never holds orphans. Deletes cascade fragments, blob, record, and
//! context membership, cancelling any in-flight pipeline first.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::model::{Context, FileRecord};
use crate::services::ingest::IngestService;
use crate::stores::{BlobError, BlobMetadata, BlobStore, DocumentStore, StoreError};
use crate::stores::blob::content_hash;
use folio_server::{ContextView, FileView};

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context `{0}` not found")]
    ContextNotFound(String),
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error("file `{file}` does not belong to context `{context}`")]
    ForeignFile { file: String, context: String },
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// One uploaded file, as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Bytes,
}

/// Blob key for a file: `{context}/{hash}{ext}` with the extension taken
/// from the original file name.
pub fn blob_key(context: &str, hash: &str, name: &str) -> String {
    let ext = std::path::Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    format!("{context}/{hash}{ext}")
}

#[derive(bon::Builder)]
pub struct ContextService {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    ingest: Arc<IngestService>,
}

impl ContextService {
    /// Create a context from one or more PDF uploads and start their
    /// pipelines. Blobs uploaded before a failed record commit are deleted.
    pub async fn create_context(&self, uploads: Vec<Upload>) -> Result<Context, ContextError> {
        if uploads.is_empty() {
            return Err(ContextError::InvalidUpload(
                "at least one PDF is required".to_string(),
            ));
        }

        let mut context = Context::new(Utc::now().date_naive());
        let mut files = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            let file = self.stage_upload(&context.id, upload).await?;
            context.files.push(file.id.clone());
            files.push(file);
        }

        if let Err(err) = self.commit_records(&context, &files).await {
            self.rollback_blobs(&context.id).await;
            return Err(err);
        }

        tracing::info!(
            event = "context_created",
            context = %context.id,
            files = files.len(),
        );
        for file in &files {
            self.ingest.spawn(file.id.clone());
        }
        Ok(context)
    }

    /// Add exactly one PDF to an existing context and start its pipeline.
    pub async fn add_file(
        &self,
        context_id: &str,
        upload: Upload,
    ) -> Result<FileRecord, ContextError> {
        let mut context = self
            .docs
            .get_context(context_id)
            .await?
            .ok_or_else(|| ContextError::ContextNotFound(context_id.to_string()))?;

        let file = self.stage_upload(&context.id, &upload).await?;
        context.files.push(file.id.clone());

        let commit = async {
            self.docs.put_file(&file).await?;
            self.docs.put_context(&context).await?;
            Ok::<(), ContextError>(())
        };
        if let Err(err) = commit.await {
            let key = blob_key(&context.id, &file.hash, &file.name);
            if let Err(cleanup) = self.blobs.delete(&key).await {
                tracing::warn!(event = "upload_rollback_failed", %key, %cleanup);
            }
            return Err(err);
        }

        tracing::info!(event = "file_added", context = %context.id, file = %file.id);
        self.ingest.spawn(file.id.clone());
        Ok(file)
    }

    /// Context plus per-file progress fields for polling clients.
    pub async fn get_context(&self, context_id: &str) -> Result<ContextView, ContextError> {
        let context = self
            .docs
            .get_context(context_id)
            .await?
            .ok_or_else(|| ContextError::ContextNotFound(context_id.to_string()))?;

        let mut files = Vec::with_capacity(context.files.len());
        for file_id in &context.files {
            // Membership without a record means a half-deleted file; skip it.
            let Some(file) = self.docs.get_file(file_id).await? else {
                tracing::warn!(event = "orphan_membership", context = %context.id, file = %file_id);
                continue;
            };
            files.push(to_file_view(&file));
        }
        Ok(ContextView {
            id: context.id,
            created_at: context.created_at,
            files,
        })
    }

    /// Delete a file and everything derived from it. An in-flight pipeline
    /// is cancelled before the cascade runs.
    pub async fn delete_file(&self, file_id: &str, context_id: &str) -> Result<(), ContextError> {
        let mut context = self
            .docs
            .get_context(context_id)
            .await?
            .ok_or_else(|| ContextError::ContextNotFound(context_id.to_string()))?;
        let file = self
            .docs
            .get_file(file_id)
            .await?
            .ok_or_else(|| ContextError::FileNotFound(file_id.to_string()))?;
        if file.context != context_id || !context.owns_file(file_id) {
            return Err(ContextError::ForeignFile {
                file: file_id.to_string(),
                context: context_id.to_string(),
            });
        }

        if self.ingest.cancel(file_id).await {
            tracing::info!(event = "delete_cancelled_ingest", file = %file_id);
        }

        let removed = self.docs.delete_fragments(file_id).await?;
        let key = blob_key(context_id, &file.hash, &file.name);
        if !self.blobs.delete(&key).await? {
            return Err(ContextError::Blob(BlobError::NotFound(key)));
        }
        self.docs.delete_file(file_id).await?;
        context.files.retain(|id| id != file_id);
        self.docs.put_context(&context).await?;

        tracing::info!(
            event = "file_deleted",
            context = %context_id,
            file = %file_id,
            fragments = removed,
        );
        Ok(())
    }

    /// Validate, hash, and upload one PDF; returns its unsaved record.
    async fn stage_upload(
        &self,
        context_id: &str,
        upload: &Upload,
    ) -> Result<FileRecord, ContextError> {
        validate_pdf(upload)?;
        let hash = content_hash(&upload.bytes);
        let file = FileRecord::new(context_id, upload.name.clone(), hash);

        let key = blob_key(context_id, &file.hash, &file.name);
        let mut metadata = BlobMetadata::new();
        metadata.insert("file_id".to_string(), file.id.clone());
        metadata.insert("context_id".to_string(), context_id.to_string());
        self.blobs.put(&key, upload.bytes.clone(), metadata).await?;
        Ok(file)
    }

    async fn commit_records(
        &self,
        context: &Context,
        files: &[FileRecord],
    ) -> Result<(), ContextError> {
        self.docs.put_context(context).await?;
        self.docs.put_files_atomic(files).await?;
        Ok(())
    }

    /// Best-effort removal of every blob under the context prefix.
    async fn rollback_blobs(&self, context_id: &str) {
        tracing::warn!(event = "upload_rollback", context = %context_id);
        let keys = match self.blobs.list(context_id).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(event = "upload_rollback_failed", context = %context_id, %err);
                return;
            }
        };
        for key in keys {
            if let Err(err) = self.blobs.delete(&key).await {
                tracing::warn!(event = "upload_rollback_failed", %key, %err);
            }
        }
        if let Err(err) = self.docs.delete_context(context_id).await {
            tracing::warn!(event = "upload_rollback_failed", context = %context_id, %err);
        }
    }
}

fn validate_pdf(upload: &Upload) -> Result<(), ContextError> {
    if !upload.bytes.starts_with(PDF_MAGIC) {
        return Err(ContextError::InvalidUpload(format!(
            "`{}` is not a PDF document",
            upload.name
        )));
    }
    Ok(())
}

fn to_file_view(file: &FileRecord) -> FileView {
    FileView {
        id: file.id.clone(),
        name: file.name.clone(),
        status: file.status.into(),
        pages: file.pages,
        processed_pages: file.processed_pages,
        chunks: file.chunks,
    }
}
