//! Ingestion progress over a bounded channel with a single writer task.
//!
//! Pipelines report page completions with `try_send`; a full channel drops
//! the event rather than stalling extraction. Only the writer task persists
//! progress, so mid-flight counters never race terminal status writes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::FileStatus;
use crate::stores::DocumentStore;

pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub file_id: String,
    pub pages: usize,
    pub processed_pages: usize,
}

impl ProgressEvent {
    /// Whole percent, rounded up.
    pub fn percent(&self) -> u8 {
        if self.pages == 0 {
            return 0;
        }
        ((self.processed_pages * 100).div_ceil(self.pages)).min(100) as u8
    }
}

/// Cheap cloneable sender handed to pipelines.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressHandle {
    /// Best-effort send; a full or closed channel drops the event.
    pub fn report(&self, event: ProgressEvent) {
        if let Err(err) = self.tx.try_send(event) {
            tracing::trace!(event = "progress_dropped", %err, "progress event dropped");
        }
    }
}

/// Spawn the single writer task and return its handle plus the join handle
/// (held by callers that need a clean shutdown in tests).
pub fn spawn_progress_writer(
    docs: Arc<dyn DocumentStore>,
    capacity: usize,
) -> (ProgressHandle, JoinHandle<()>) {
    debug_assert!(capacity > 0);
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(capacity.max(1));
    let join = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            write_progress(docs.as_ref(), &event).await;
        }
    });
    (ProgressHandle { tx }, join)
}

async fn write_progress(docs: &dyn DocumentStore, event: &ProgressEvent) {
    let file = match docs.get_file(&event.file_id).await {
        Ok(Some(file)) => file,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(event = "progress_load_failed", file = %event.file_id, %err);
            return;
        }
    };
    // Terminal writes come from the pipeline itself; do not resurrect them.
    if file.status != FileStatus::Processing {
        return;
    }
    let mut file = file;
    file.pages = event.pages;
    file.processed_pages = event.processed_pages.min(event.pages);
    if let Err(err) = docs.put_file(&file).await {
        tracing::warn!(event = "progress_write_failed", file = %event.file_id, %err);
        return;
    }
    tracing::debug!(
        event = "progress",
        file = %event.file_id,
        processed = event.processed_pages,
        pages = event.pages,
        percent = event.percent(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileRecord;
    use crate::stores::MemoryDocumentStore;

    fn processing_file() -> FileRecord {
        let mut file = FileRecord::new("ctx_test", "a.pdf", "hash");
        file.status = FileStatus::Processing;
        file.pages = 4;
        file
    }

    #[test]
    fn percent_rounds_up_and_clamps() {
        let event = ProgressEvent {
            file_id: "file_x".to_string(),
            pages: 3,
            processed_pages: 1,
        };
        assert_eq!(event.percent(), 34);
        let done = ProgressEvent {
            file_id: "file_x".to_string(),
            pages: 3,
            processed_pages: 3,
        };
        assert_eq!(done.percent(), 100);
        let empty = ProgressEvent {
            file_id: "file_x".to_string(),
            pages: 0,
            processed_pages: 0,
        };
        assert_eq!(empty.percent(), 0);
    }

    #[tokio::test]
    async fn writer_persists_progress_for_processing_files() {
        let docs = Arc::new(MemoryDocumentStore::new());
        let file = processing_file();
        docs.put_file(&file).await.expect("put");

        let (handle, join) = spawn_progress_writer(docs.clone(), 8);
        handle.report(ProgressEvent {
            file_id: file.id.clone(),
            pages: 4,
            processed_pages: 2,
        });
        drop(handle);
        join.await.expect("writer task");

        let loaded = docs.get_file(&file.id).await.expect("get").expect("present");
        assert_eq!(loaded.processed_pages, 2);
    }

    #[tokio::test]
    async fn writer_skips_terminal_files() {
        let docs = Arc::new(MemoryDocumentStore::new());
        let mut file = processing_file();
        file.status = FileStatus::Processed;
        file.processed_pages = 4;
        docs.put_file(&file).await.expect("put");

        let (handle, join) = spawn_progress_writer(docs.clone(), 8);
        handle.report(ProgressEvent {
            file_id: file.id.clone(),
            pages: 4,
            processed_pages: 1,
        });
        drop(handle);
        join.await.expect("writer task");

        let loaded = docs.get_file(&file.id).await.expect("get").expect("present");
        assert_eq!(loaded.processed_pages, 4, "terminal record left alone");
    }
}
