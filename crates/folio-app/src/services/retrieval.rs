//! Nearest-fragment retrieval for a question within one context.

use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::embed::{EmbedError, EmbeddingBatcher};
use crate::stores::{DocumentStore, ScoredFragment, StoreError};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RetrievalError {
    /// True when the failure originated in the embedding provider rather
    /// than in local storage.
    pub fn is_provider(&self) -> bool {
        matches!(self, RetrievalError::Embed(EmbedError::Provider(_)))
    }
}

#[derive(bon::Builder)]
pub struct RetrievalEngine {
    docs: Arc<dyn DocumentStore>,
    batcher: Arc<EmbeddingBatcher>,
    #[builder(default = 3)]
    default_top_k: usize,
}

impl RetrievalEngine {
    /// Embed the question and return the `top_k` closest fragments from the
    /// given context, nearest first, each with its cosine distance. Contexts
    /// with no indexed fragments yield an empty list, not an error.
    pub async fn retrieve(
        &self,
        context_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredFragment>, RetrievalError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let query = self.batcher.embed_query(question).await?;
        let hits = self.docs.query_nearest(context_id, &query, top_k).await?;
        tracing::debug!(
            event = "retrieval",
            context = %context_id,
            top_k,
            hits = hits.len(),
        );
        Ok(hits)
    }
}
