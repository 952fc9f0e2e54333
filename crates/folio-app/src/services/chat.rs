//! Retrieval-augmented chat over one context.
//!
//! The model only ever sees retrieved fragments, each tagged with its
//! citation token. The reply carries the tokens it actually used, which
//! the caller can later exchange for the cited pages.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{FileRecord, Fragment};
use crate::services::citation::CitationToken;
use crate::services::retrieval::{RetrievalEngine, RetrievalError};
use crate::stores::{DocumentStore, StoreError};
use folio_server::{ChatMessage, ChatRequest, ChatResponse};

const SYSTEM_PROMPT: &str = "\
You are an assistant that answers strictly from the sources below. \
Every source starts with `# source:` followed by its citation token. \
Answer using only information found in the sources, and list the tokens \
of every source you relied on. If the sources do not contain the answer, \
say so instead of guessing.";

const NO_SOURCES_BLOCK: &str = "# source: none\nno fragment found";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("context `{0}` not found")]
    ContextNotFound(String),
    #[error("the request contains no user question")]
    EmptyQuestion,
    #[error("chat provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything the model needs for one turn.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub question: String,
}

/// The model's structured reply: prose plus the citation tokens it used.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub answer: String,
    pub fonts: Vec<String>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn reply(&self, prompt: &ChatPrompt) -> Result<ModelReply, ChatError>;
}

/// One answered turn, with the cited file records already resolved.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: String,
    pub fonts: Vec<String>,
    pub files: Vec<FileRecord>,
}

impl ChatOutcome {
    pub fn into_response(self) -> ChatResponse {
        ChatResponse {
            answer: self.answer,
            fonts: self.fonts,
            files: self.files.into_iter().map(|f| f.name).collect(),
        }
    }
}

#[derive(bon::Builder)]
pub struct ChatService {
    docs: Arc<dyn DocumentStore>,
    retrieval: Arc<RetrievalEngine>,
    provider: Arc<dyn ChatProvider>,
}

impl ChatService {
    pub async fn chat(
        &self,
        context_id: &str,
        request: &ChatRequest,
    ) -> Result<ChatOutcome, ChatError> {
        let context = self
            .docs
            .get_context(context_id)
            .await?
            .ok_or_else(|| ChatError::ContextNotFound(context_id.to_string()))?;
        let question = request.question().ok_or(ChatError::EmptyQuestion)?;

        let hits = self
            .retrieval
            .retrieve(context_id, question, Some(request.effective_top_k()))
            .await?;
        let fragments: Vec<Fragment> = hits.into_iter().map(|hit| hit.fragment).collect();
        let prompt = ChatPrompt {
            system: assemble_system_prompt(&fragments),
            history: request.history.clone(),
            question: question.to_string(),
        };

        let reply = self.provider.reply(&prompt).await?;
        let files = self.resolve_cited_files(&context.files, &reply.fonts).await?;
        tracing::info!(
            event = "chat_answered",
            context = %context_id,
            fragments = fragments.len(),
            citations = reply.fonts.len(),
        );
        Ok(ChatOutcome {
            answer: reply.answer,
            fonts: reply.fonts,
            files,
        })
    }

    /// Cited file records in first-referenced order. Tokens the model
    /// malformed or that point outside the context are dropped.
    async fn resolve_cited_files(
        &self,
        owned: &[String],
        fonts: &[String],
    ) -> Result<Vec<FileRecord>, ChatError> {
        let mut seen = Vec::new();
        let mut files = Vec::new();
        for font in fonts {
            let Ok(token) = CitationToken::parse(font) else {
                tracing::debug!(event = "chat_bad_citation", token = %font);
                continue;
            };
            if seen.contains(&token.file) {
                continue;
            }
            seen.push(token.file.clone());
            if !owned.iter().any(|id| *id == token.file) {
                tracing::debug!(event = "chat_foreign_citation", file = %token.file);
                continue;
            }
            if let Some(record) = self.docs.get_file(&token.file).await? {
                files.push(record);
            }
        }
        Ok(files)
    }
}

fn assemble_system_prompt(fragments: &[Fragment]) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\n");
    if fragments.is_empty() {
        prompt.push_str(NO_SOURCES_BLOCK);
    } else {
        for fragment in fragments {
            prompt.push_str("# source: ");
            prompt.push_str(&fragment.citation_token());
            prompt.push('\n');
            prompt.push_str(&fragment.text);
            prompt.push_str("\n\n");
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::new_fragment_id;

    fn fragment(file: &str, page: usize, ordinal: u32, text: &str) -> Fragment {
        Fragment {
            id: new_fragment_id(),
            context: "ctx_test0000".to_string(),
            file: file.to_string(),
            page_index: page,
            text: text.to_string(),
            len: text.chars().count(),
            embedding: vec![0.0; 4],
            ordinal,
        }
    }

    #[test]
    fn prompt_tags_each_fragment_with_its_token() {
        let frags = vec![
            fragment("file_aaaaaaaa", 0, 0, "alpha"),
            fragment("file_bbbbbbbb", 3, 7, "beta"),
        ];
        let prompt = assemble_system_prompt(&frags);
        assert!(prompt.contains("# source: 0-file_aaaaaaaa-0\nalpha"));
        assert!(prompt.contains("# source: 3-file_bbbbbbbb-7\nbeta"));
    }

    #[test]
    fn empty_retrieval_gets_an_explicit_no_fragment_block() {
        let prompt = assemble_system_prompt(&[]);
        assert!(prompt.contains("no fragment found"));
    }
}
