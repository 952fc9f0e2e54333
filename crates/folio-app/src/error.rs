use thiserror::Error;

use crate::config::AppConfigError;
use crate::paths::PathError;
use crate::pdf::PdfError;
use crate::pipeline::chunk::ChunkError;
use crate::pipeline::embed::EmbedError;
use crate::pipeline::extract::ExtractError;
use crate::server::ServerError;
use crate::services::chat::ChatError;
use crate::services::citation::CitationError;
use crate::services::contexts::ContextError;
use crate::services::ingest::IngestError;
use crate::services::retrieval::RetrievalError;
use crate::stores::{BlobError, StoreError};

/// Top-level error for the binary. Every module keeps its own error enum;
/// this aggregates them at the edge.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] AppConfigError),
    #[error(transparent)]
    Path(#[from] PathError),
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
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Citation(#[from] CitationError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
