//! Core domain records: contexts, files, fragments, and page text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

pub const CONTEXT_ID_PREFIX: &str = "ctx_";
pub const FILE_ID_PREFIX: &str = "file_";
pub const FRAGMENT_ID_PREFIX: &str = "frag_";

const SHORT_ID_LEN: usize = 8;

/// Generate a prefixed short id: the prefix plus the first eight hex
/// characters of a v4 UUID.
fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    debug_assert!(hex.len() >= SHORT_ID_LEN);
    format!("{prefix}{}", &hex[..SHORT_ID_LEN])
}

pub fn new_context_id() -> String {
    short_id(CONTEXT_ID_PREFIX)
}

pub fn new_file_id() -> String {
    short_id(FILE_ID_PREFIX)
}

pub fn new_fragment_id() -> String {
    short_id(FRAGMENT_ID_PREFIX)
}

/// Processing lifecycle of an uploaded file.
///
/// `Processed` and `ProcessingFailed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileStatus {
    #[default]
    NotProcessed,
    Processing,
    Processed,
    ProcessingFailed,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Processed | FileStatus::ProcessingFailed)
    }
}

impl From<FileStatus> for folio_server::FileStatusView {
    fn from(status: FileStatus) -> Self {
        use folio_server::FileStatusView as View;
        match status {
            FileStatus::NotProcessed => View::NotProcessed,
            FileStatus::Processing => View::Processing,
            FileStatus::Processed => View::Processed,
            FileStatus::ProcessingFailed => View::ProcessingFailed,
        }
    }
}

/// A conversation scope: owns files and the fragments retrieved for chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub created_at: NaiveDate,
    /// Ids of member files, in upload order.
    pub files: Vec<String>,
}

impl Context {
    pub fn new(created_at: NaiveDate) -> Self {
        Self {
            id: new_context_id(),
            created_at,
            files: Vec::new(),
        }
    }

    pub fn owns_file(&self, file_id: &str) -> bool {
        self.files.iter().any(|id| id == file_id)
    }
}

/// Persistent record of one uploaded PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub context: String,
    pub name: String,
    /// Content hash of the stored blob; doubles as part of the blob key.
    pub hash: String,
    pub status: FileStatus,
    pub pages: usize,
    pub processed_pages: usize,
    pub chunks: usize,
}

impl FileRecord {
    pub fn new(
        context: impl Into<String>,
        name: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            id: new_file_id(),
            context: context.into(),
            name: name.into(),
            hash: hash.into(),
            status: FileStatus::NotProcessed,
            pages: 0,
            processed_pages: 0,
            chunks: 0,
        }
    }
}

/// One embedded chunk of a file's cleaned text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub context: String,
    pub file: String,
    /// Index of the page the fragment starts on.
    pub page_index: usize,
    pub text: String,
    /// Fragment length in chars.
    pub len: usize,
    pub embedding: Vec<f32>,
    /// Position of this fragment within its file, starting at zero.
    pub ordinal: u32,
}

impl Fragment {
    /// The citation token a model uses to reference this fragment.
    pub fn citation_token(&self) -> String {
        format!("{}-{}-{}", self.page_index, self.file, self.ordinal)
    }
}

/// Cleaned text of a single page, produced by layout extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub index: usize,
    pub text: String,
    /// Char count of `text`; cached because chunk offsets are char offsets.
    pub len: usize,
}

impl PageText {
    pub fn new(index: usize, text: String) -> Self {
        let len = text.chars().count();
        Self { index, text, len }
    }
}
