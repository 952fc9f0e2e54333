//! Pure pipeline stages: page text extraction, chunking, and embedding.
//!
//! Modules here hold the transforms; IO orchestration (provider calls,
//! store writes, progress) lives in `crate::services`.

pub mod chunk;
pub mod embed;
pub mod extract;

pub use chunk::{Chunk, ChunkError, ChunkingLimits, chunk_pages};
pub use embed::{EmbedError, EmbeddingBatcher, EmbeddingProvider};
pub use extract::{
    CellKind, ExtractError, LayoutProvider, PageLayout, Span, Table, TableCell, clean_text,
    extract_page_text,
};
