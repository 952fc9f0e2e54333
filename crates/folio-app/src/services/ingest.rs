//! File ingestion pipeline: blob to committed fragments.
//!
//! One file's pipeline is one logical unit: split pages, extract layout text
//! with bounded concurrency, chunk, embed, then commit the whole fragment set
//! atomically. Failures are flipped to `ProcessingFailed` here so callers of
//! the upload paths never see mid-flight errors; status is polled instead.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::model::{new_fragment_id, FileRecord, FileStatus, Fragment, PageText};
use crate::pdf::{self, PdfError};
use crate::pipeline::{
    chunk_pages, extract_page_text, ChunkError, ChunkingLimits, EmbedError, EmbeddingBatcher,
    ExtractError, LayoutProvider,
};
use crate::services::contexts::blob_key;
use crate::services::progress::{ProgressEvent, ProgressHandle};
use crate::stores::{BlobError, BlobStore, DocumentStore, StoreError};

pub type GenericRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("ingestion cancelled for file `{0}`")]
    Cancelled(String),
}

impl IngestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Cancelled(_))
    }
}

pub fn default_layout_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(5)
        .with_jitter()
}

pub fn layout_rate_limiter(requests_per_second: u32) -> Arc<GenericRateLimiter> {
    let quota = Quota::per_second(
        NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN),
    );
    Arc::new(RateLimiter::direct(quota))
}

struct FileSlot {
    gate: Arc<Mutex<()>>,
    token: CancellationToken,
}

/// Runs file pipelines. Same-file runs are serialized through a per-file
/// mutex; each run holds a cancellation token that `cancel` trips.
#[derive(bon::Builder)]
pub struct IngestService {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    layout: Arc<dyn LayoutProvider>,
    batcher: EmbeddingBatcher,
    limiter: Arc<GenericRateLimiter>,
    progress: ProgressHandle,
    #[builder(default)]
    limits: ChunkingLimits,
    #[builder(default = 4)]
    page_concurrency: usize,
    #[builder(default = default_layout_backoff())]
    backoff: ExponentialBuilder,
    #[builder(skip)]
    inflight: Mutex<HashMap<String, FileSlot>>,
}

impl IngestService {
    /// Run the whole pipeline for one file, serialized against other runs of
    /// the same file. On failure the record is marked `ProcessingFailed`
    /// before the error is returned.
    pub async fn process_file(&self, file_id: &str) -> Result<(), IngestError> {
        let (gate, token) = self.checkout(file_id).await;
        let _guard = gate.lock().await;

        let result = self.run_pipeline(file_id, &token).await;
        if let Err(err) = &result {
            self.fail_file(file_id, err).await;
        }
        result
    }

    /// Fire-and-forget variant used by the upload handlers.
    pub fn spawn(self: &Arc<Self>, file_id: String) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = service.process_file(&file_id).await {
                tracing::warn!(event = "ingest_task_failed", file = %file_id, %err);
            }
        });
    }

    /// Cancel an in-flight pipeline. Returns whether a live run was signalled.
    pub async fn cancel(&self, file_id: &str) -> bool {
        let inflight = self.inflight.lock().await;
        match inflight.get(file_id) {
            Some(slot) if !slot.token.is_cancelled() => {
                slot.token.cancel();
                tracing::info!(event = "ingest_cancel", file = %file_id);
                true
            }
            _ => false,
        }
    }

    async fn checkout(&self, file_id: &str) -> (Arc<Mutex<()>>, CancellationToken) {
        let mut inflight = self.inflight.lock().await;
        let slot = inflight
            .entry(file_id.to_string())
            .or_insert_with(|| FileSlot {
                gate: Arc::new(Mutex::new(())),
                token: CancellationToken::new(),
            });
        if slot.token.is_cancelled() {
            slot.token = CancellationToken::new();
        }
        (Arc::clone(&slot.gate), slot.token.clone())
    }

    async fn run_pipeline(
        &self,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let mut file = self
            .docs
            .get_file(file_id)
            .await?
            .ok_or_else(|| IngestError::FileNotFound(file_id.to_string()))?;
        tracing::info!(event = "ingest_start", file = %file.id, name = %file.name);

        file.status = FileStatus::Processing;
        file.processed_pages = 0;
        file.chunks = 0;
        self.docs.put_file(&file).await?;

        let key = blob_key(&file.context, &file.hash, &file.name);
        let bytes = self.blobs.get(&key).await?;

        let pages_total = pdf::page_count(&bytes)?;
        file.pages = pages_total;
        self.docs.put_file(&file).await?;
        self.progress.report(ProgressEvent {
            file_id: file.id.clone(),
            pages: pages_total,
            processed_pages: 0,
        });

        let pages = self.extract_pages(&file, &bytes, pages_total, cancel).await?;

        let chunks = chunk_pages(&pages, &self.limits)?;
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled(file.id.clone()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.batcher.embed_documents(&texts).await?;
        debug_assert_eq!(embeddings.len(), chunks.len());
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled(file.id.clone()));
        }

        let fragments: Vec<Fragment> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, (chunk, embedding))| Fragment {
                id: new_fragment_id(),
                context: file.context.clone(),
                file: file.id.clone(),
                page_index: chunk.page_index,
                text: chunk.text,
                len: chunk.len,
                embedding,
                ordinal: ordinal as u32,
            })
            .collect();
        let committed = fragments.len();
        self.docs.commit_fragments(&file.id, fragments).await?;

        file.status = FileStatus::Processed;
        file.processed_pages = pages_total;
        file.chunks = committed;
        self.docs.put_file(&file).await?;
        tracing::info!(
            event = "ingest_done",
            file = %file.id,
            pages = pages_total,
            chunks = committed,
        );
        Ok(())
    }

    /// Split, rate-limit, analyze, and clean every page. The buffered stream
    /// preserves page order, which the chunk offset table depends on.
    async fn extract_pages(
        &self,
        file: &FileRecord,
        bytes: &Bytes,
        total: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageText>, IngestError> {
        let mut stream = stream::iter(0..total)
            .map(|page_index| {
                let bytes = bytes.clone();
                async move {
                    self.limiter.until_ready().await;
                    let page_pdf = pdf::single_page(&bytes, page_index)?;
                    let attempt =
                        || async { self.layout.analyze_page(&page_pdf, page_index).await };
                    let layout = attempt.retry(self.backoff.clone()).await?;
                    let page = extract_page_text(&layout, page_index)?;
                    Ok::<PageText, IngestError>(page)
                }
            })
            .buffered(self.page_concurrency.max(1));

        let mut pages = Vec::with_capacity(total);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(IngestError::Cancelled(file.id.clone()));
                }
                next = stream.next() => next,
            };
            let Some(result) = next else { break };
            pages.push(result?);
            self.progress.report(ProgressEvent {
                file_id: file.id.clone(),
                pages: total,
                processed_pages: pages.len(),
            });
            tracing::debug!(
                event = "page_extracted",
                file = %file.id,
                processed = pages.len(),
                total,
            );
        }
        debug_assert_eq!(pages.len(), total);
        Ok(pages)
    }

    async fn fail_file(&self, file_id: &str, err: &IngestError) {
        let cause = if err.is_cancelled() { "cancelled" } else { "error" };
        tracing::warn!(event = "ingest_failed", file = %file_id, cause, error = %err);
        match self.docs.get_file(file_id).await {
            Ok(Some(mut file)) => {
                file.status = FileStatus::ProcessingFailed;
                if let Err(persist) = self.docs.put_file(&file).await {
                    tracing::error!(event = "ingest_fail_unrecorded", file = %file_id, %persist);
                }
            }
            // Deleted mid-flight; nothing left to mark.
            Ok(None) => {}
            Err(load) => {
                tracing::error!(event = "ingest_fail_unrecorded", file = %file_id, %load);
            }
        }
    }
}
