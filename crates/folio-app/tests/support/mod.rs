//! Shared fixtures: sample PDFs, deterministic providers, and a fully
//! wired service stack over in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use tokio::sync::Mutex;

use folio_app::pipeline::chunk::ChunkingLimits;
use folio_app::pipeline::embed::{EmbedError, EmbeddingBatcher, EmbeddingProvider};
use folio_app::pipeline::extract::{ExtractError, LayoutProvider, PageLayout};
use folio_app::services::chat::{ChatError, ChatPrompt, ChatProvider, ChatService, ModelReply};
use folio_app::services::ingest::{IngestService, layout_rate_limiter};
use folio_app::services::{
    CitationResolver, ContextService, RetrievalEngine, spawn_progress_writer,
};
use folio_app::stores::{BlobStore, DocumentStore, MemoryBlobStore, MemoryDocumentStore};

pub const EMBED_DIM: usize = 8;

/// Small multi-page document; every page draws one line of text.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(pages);
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("page {i}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as u32,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save sample pdf");
    out
}

/// Layout provider that answers with fixed prose per page. Long enough
/// that the default chunking limits produce at least one chunk per file.
pub struct StaticLayout;

#[async_trait]
impl LayoutProvider for StaticLayout {
    async fn analyze_page(
        &self,
        _page_pdf: &[u8],
        page_index: usize,
    ) -> Result<PageLayout, ExtractError> {
        let content = format!(
            "Page {page_index} holds sixty characters of entirely ordinary prose. "
        )
        .repeat(2);
        Ok(PageLayout {
            content,
            tables: Vec::new(),
        })
    }
}

/// Stalls long enough for a test to cancel the run mid-flight.
pub struct SlowLayout;

#[async_trait]
impl LayoutProvider for SlowLayout {
    async fn analyze_page(
        &self,
        _page_pdf: &[u8],
        page_index: usize,
    ) -> Result<PageLayout, ExtractError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(PageLayout {
            content: format!("page {page_index}"),
            tables: Vec::new(),
        })
    }
}

/// Always fails; used to drive files into the failed state.
pub struct FailingLayout;

#[async_trait]
impl LayoutProvider for FailingLayout {
    async fn analyze_page(
        &self,
        _page_pdf: &[u8],
        page_index: usize,
    ) -> Result<PageLayout, ExtractError> {
        Err(ExtractError::provider(page_index, "layout backend is down"))
    }
}

/// Deterministic embeddings: the vector is a function of the text alone,
/// so a query embeds identically to the fragment it was copied from.
pub struct HashEmbedding;

fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBED_DIM];
    v[0] = text.chars().count() as f32;
    let mut acc: u32 = 2166136261;
    for (i, b) in text.bytes().enumerate() {
        acc = acc.wrapping_mul(16777619) ^ u32::from(b);
        v[1 + (i % (EMBED_DIM - 1))] += (acc % 1000) as f32 / 1000.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Replays a canned reply and records every prompt it was shown.
pub struct ScriptedChat {
    pub reply: ModelReply,
    pub prompts: Mutex<Vec<ChatPrompt>>,
}

impl ScriptedChat {
    pub fn new(answer: &str, fonts: Vec<String>) -> Self {
        Self {
            reply: ModelReply {
                answer: answer.to_string(),
                fonts,
            },
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn reply(&self, prompt: &ChatPrompt) -> Result<ModelReply, ChatError> {
        self.prompts.lock().await.push(prompt.clone());
        Ok(self.reply.clone())
    }
}

/// Everything wired over in-memory stores. Concrete store handles stay
/// available for direct assertions.
pub struct TestStack {
    pub docs: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub ingest: Arc<IngestService>,
    pub contexts: Arc<ContextService>,
    pub retrieval: Arc<RetrievalEngine>,
    pub chat: Arc<ChatService>,
    pub citations: Arc<CitationResolver>,
}

/// Assemble the stack with the given providers. Chunking limits are kept
/// small so a couple of sample pages yield several fragments.
pub fn build_stack(
    layout: Arc<dyn LayoutProvider>,
    chat_provider: Arc<dyn ChatProvider>,
) -> TestStack {
    let docs = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let docs_dyn: Arc<dyn DocumentStore> = docs.clone();
    let blobs_dyn: Arc<dyn BlobStore> = blobs.clone();

    let batcher = EmbeddingBatcher::builder()
        .provider(Arc::new(HashEmbedding))
        .dim(EMBED_DIM)
        .build();
    let limits = ChunkingLimits {
        window: 64,
        overlap: 8,
        sentence_lookahead: 16,
    };
    let (progress, _writer) = spawn_progress_writer(docs_dyn.clone(), 64);

    let ingest = Arc::new(
        IngestService::builder()
            .docs(docs_dyn.clone())
            .blobs(blobs_dyn.clone())
            .layout(layout)
            .batcher(batcher.clone())
            .limiter(layout_rate_limiter(1000))
            .progress(progress)
            .limits(limits)
            .backoff(
                backon::ExponentialBuilder::default()
                    .with_min_delay(std::time::Duration::from_millis(1))
                    .with_max_times(1),
            )
            .build(),
    );
    let contexts = Arc::new(
        ContextService::builder()
            .docs(docs_dyn.clone())
            .blobs(blobs_dyn.clone())
            .ingest(ingest.clone())
            .build(),
    );
    let retrieval = Arc::new(
        RetrievalEngine::builder()
            .docs(docs_dyn.clone())
            .batcher(Arc::new(batcher))
            .build(),
    );
    let chat = Arc::new(
        ChatService::builder()
            .docs(docs_dyn.clone())
            .retrieval(retrieval.clone())
            .provider(chat_provider)
            .build(),
    );
    let citations = Arc::new(
        CitationResolver::builder()
            .docs(docs_dyn)
            .blobs(blobs_dyn)
            .build(),
    );

    TestStack {
        docs,
        blobs,
        ingest,
        contexts,
        retrieval,
        chat,
        citations,
    }
}
