//! Embedding provider seam and the ordered batcher in front of it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch { sent: usize, received: usize },
}

impl EmbedError {
    pub fn provider(message: impl Into<String>) -> Self {
        EmbedError::Provider(message.into())
    }
}

/// Turns text into fixed-dimension vectors. Implementations wrap an external
/// embedding model endpoint.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embeds a file's fragments in provider-sized batches with bounded
/// concurrency. Output order always matches input order; any single batch
/// failure aborts the whole call.
#[derive(Clone, bon::Builder)]
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    dim: usize,
    #[builder(default = 4)]
    concurrency: usize,
    #[builder(default = 16)]
    max_batch: usize,
}

impl EmbeddingBatcher {
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed every text, preserving order.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        debug_assert!(self.dim > 0);
        debug_assert!(self.max_batch > 0);
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Batches are owned so the embedding future stays `Send + 'static`
        // and can ride inside a spawned pipeline task.
        let batches: Vec<Vec<String>> = texts
            .chunks(self.max_batch)
            .map(|chunk| chunk.to_vec())
            .collect();
        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| async move {
                let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
                let vectors = self.provider.embed_batch(&refs).await?;
                self.check_batch(&refs, &vectors)?;
                Ok::<_, EmbedError>(vectors)
            })
            // `buffered` keeps output in input order, which fragment ordinals
            // depend on.
            .buffered(self.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }

    /// Embed one query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vectors = self.provider.embed_batch(&[text]).await?;
        self.check_batch(&[text], &vectors)?;
        let mut vectors = vectors;
        Ok(vectors.swap_remove(0))
    }

    fn check_batch(&self, sent: &[&str], received: &[Vec<f32>]) -> Result<(), EmbedError> {
        if sent.len() != received.len() {
            return Err(EmbedError::CountMismatch {
                sent: sent.len(),
                received: received.len(),
            });
        }
        for vector in received {
            if vector.len() != self.dim {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dim,
                    got: vector.len(),
                });
            }
        }
        Ok(())
    }
}
