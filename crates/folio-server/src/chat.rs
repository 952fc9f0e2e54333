use serde::{Deserialize, Serialize};

pub const RETRIEVAL_TOP_K_DEFAULT: usize = 3;
pub const RETRIEVAL_TOP_K_MAX: usize = 20;

/// Message author in a chat transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Single turn of a chat transcript as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat request body. The last user message is the question to answer; prior
/// turns are passed through to the model verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub history: Vec<ChatMessage>,
    /// Optional override for the number of fragments retrieved per question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl ChatRequest {
    /// The question the caller expects an answer for, if the transcript has one.
    pub fn question(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }

    pub fn effective_top_k(&self) -> usize {
        self.top_k
            .unwrap_or(RETRIEVAL_TOP_K_DEFAULT)
            .clamp(1, RETRIEVAL_TOP_K_MAX)
    }
}

/// Chat answer plus the citation tokens the model emitted.
///
/// `fonts` is the historical wire name for the citation token list; each entry
/// has the form `{page_index}-{file_id}-{ordinal}`. `files` lists the display
/// names of the files those tokens resolved to, in first-referenced order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub fonts: Vec<String>,
    pub files: Vec<String>,
}

/// Request body for cited-page PDF reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentsRequest {
    pub fonts: Vec<String>,
}
