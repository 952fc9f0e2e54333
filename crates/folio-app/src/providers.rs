//! Provider stubs used when no external backend is configured.
//!
//! The pipeline talks to layout analysis, embeddings, and chat models
//! through traits. These stubs keep the server bootable without any
//! credentials; every call answers with a provider error telling the
//! operator what is missing. Real backends implement the same traits.

use async_trait::async_trait;

use crate::pipeline::embed::{EmbedError, EmbeddingProvider};
use crate::pipeline::extract::{ExtractError, LayoutProvider, PageLayout};
use crate::services::chat::{ChatError, ChatPrompt, ChatProvider, ModelReply};

const NO_PROVIDER: &str = "no provider configured; supply a backend for this service";

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredLayout;

#[async_trait]
impl LayoutProvider for UnconfiguredLayout {
    async fn analyze_page(
        &self,
        _page_pdf: &[u8],
        page_index: usize,
    ) -> Result<PageLayout, ExtractError> {
        Err(ExtractError::provider(page_index, NO_PROVIDER))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredEmbedding;

#[async_trait]
impl EmbeddingProvider for UnconfiguredEmbedding {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::provider(NO_PROVIDER))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredChat;

#[async_trait]
impl ChatProvider for UnconfiguredChat {
    async fn reply(&self, _prompt: &ChatPrompt) -> Result<ModelReply, ChatError> {
        Err(ChatError::Provider(NO_PROVIDER.to_string()))
    }
}
