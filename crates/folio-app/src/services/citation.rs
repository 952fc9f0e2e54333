//! Citation tokens and cited-page PDF reconstruction.
//!
//! A token is `{page_index}-{file_id}-{ordinal}`. Resolving a set of
//! tokens yields one merged PDF holding, for every cited file, the cited
//! pages plus one page of surrounding context on each side.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::pdf::{self, PdfError};
use crate::services::contexts::blob_key;
use crate::stores::{BlobError, BlobStore, DocumentStore, StoreError};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a literal; construction cannot fail.
    match Regex::new(r"^(\d+)-(file_[0-9a-f]{8})-(\d+)$") {
        Ok(re) => re,
        Err(_) => unreachable!("token pattern is valid"),
    }
});

#[derive(Debug, Error)]
pub enum CitationError {
    #[error("context `{0}` not found")]
    ContextNotFound(String),
    #[error("malformed citation token `{0}`")]
    Malformed(String),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// A parsed citation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationToken {
    pub page_index: usize,
    pub file: String,
    pub ordinal: u32,
}

impl CitationToken {
    pub fn parse(token: &str) -> Result<Self, CitationError> {
        let caps = TOKEN_RE
            .captures(token)
            .ok_or_else(|| CitationError::Malformed(token.to_string()))?;
        let page_index = caps[1]
            .parse()
            .map_err(|_| CitationError::Malformed(token.to_string()))?;
        let ordinal = caps[3]
            .parse()
            .map_err(|_| CitationError::Malformed(token.to_string()))?;
        Ok(Self {
            page_index,
            file: caps[2].to_string(),
            ordinal,
        })
    }
}

#[derive(bon::Builder)]
pub struct CitationResolver {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

impl CitationResolver {
    /// Build one PDF containing the pages the tokens cite, expanded by one
    /// neighbouring page on each side. Files appear in first-referenced
    /// order. Tokens naming files outside the context are dropped; if
    /// nothing survives the result is a valid page-less document.
    pub async fn cited_pdf(
        &self,
        context_id: &str,
        fonts: &[String],
    ) -> Result<Vec<u8>, CitationError> {
        let context = self
            .docs
            .get_context(context_id)
            .await?
            .ok_or_else(|| CitationError::ContextNotFound(context_id.to_string()))?;

        let mut tokens = Vec::with_capacity(fonts.len());
        for font in fonts {
            tokens.push(CitationToken::parse(font)?);
        }

        let mut parts = Vec::new();
        for (file_id, pages) in group_by_file(&tokens) {
            if !context.owns_file(&file_id) {
                tracing::debug!(event = "foreign_citation_dropped", file = %file_id);
                continue;
            }
            let Some(record) = self.docs.get_file(&file_id).await? else {
                tracing::debug!(event = "cited_file_missing", file = %file_id);
                continue;
            };
            if record.pages == 0 {
                continue;
            }
            let pages = expand_pages(&pages, record.pages);
            let key = blob_key(context_id, &record.hash, &record.name);
            let bytes = self.blobs.get(&key).await?;
            parts.push(pdf::extract_pages(&bytes, &pages)?);
        }

        tracing::info!(
            event = "cited_pdf",
            context = %context_id,
            tokens = tokens.len(),
            files = parts.len(),
        );
        if parts.is_empty() {
            return Ok(pdf::empty_document()?);
        }
        Ok(pdf::merge_documents(parts)?)
    }
}

/// Cited page indices per file, files in first-referenced order.
fn group_by_file(tokens: &[CitationToken]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for token in tokens {
        match groups.iter_mut().find(|(file, _)| *file == token.file) {
            Some((_, pages)) => pages.push(token.page_index),
            None => groups.push((token.file.clone(), vec![token.page_index])),
        }
    }
    groups
}

/// Each cited page takes its neighbours along, clamped to the document.
fn expand_pages(cited: &[usize], total_pages: usize) -> Vec<usize> {
    debug_assert!(total_pages > 0);
    let last = total_pages - 1;
    let mut pages: Vec<usize> = cited
        .iter()
        .flat_map(|&p| {
            let p = p.min(last);
            p.saturating_sub(1)..=(p + 1).min(last)
        })
        .collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}
