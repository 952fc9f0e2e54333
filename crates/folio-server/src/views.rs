use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Processing status of a single file, as shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatusView {
    NotProcessed,
    Processing,
    Processed,
    ProcessingFailed,
}

/// Per-file view inside a context, including the progress fields clients poll
/// while ingestion is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileView {
    pub id: String,
    pub name: String,
    pub status: FileStatusView,
    pub pages: usize,
    pub processed_pages: usize,
    pub chunks: usize,
}

impl FileView {
    /// Ingestion progress in whole percent, rounded up.
    pub fn progress_percent(&self) -> u8 {
        if self.pages == 0 {
            return 0;
        }
        let percent = (self.processed_pages * 100).div_ceil(self.pages);
        percent.min(100) as u8
    }
}

/// Context with its file views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextView {
    pub id: String,
    pub created_at: NaiveDate,
    pub files: Vec<FileView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_view(pages: usize, processed: usize) -> FileView {
        FileView {
            id: "file_00000000".to_string(),
            name: "a.pdf".to_string(),
            status: FileStatusView::Processing,
            pages,
            processed_pages: processed,
            chunks: 0,
        }
    }

    #[test]
    fn progress_rounds_up() {
        assert_eq!(file_view(3, 1).progress_percent(), 34);
        assert_eq!(file_view(3, 2).progress_percent(), 67);
        assert_eq!(file_view(3, 3).progress_percent(), 100);
    }

    #[test]
    fn progress_handles_empty_file() {
        assert_eq!(file_view(0, 0).progress_percent(), 0);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&FileStatusView::ProcessingFailed).expect("serialize");
        assert_eq!(json, "\"processing_failed\"");
    }
}
