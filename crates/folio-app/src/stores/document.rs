//! Document store seam: contexts, file records, and fragment partitions.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{Context, FileRecord, Fragment};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("atomic batch rejected: {0}")]
    Batch(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }
}

/// One nearest-neighbour hit: the fragment plus its cosine distance to the
/// query, lower being closer.
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub distance: f32,
}

/// Partition-addressed persistence for the three record kinds.
///
/// Fragments are partitioned by file id; `commit_fragments` and
/// `delete_fragments` are atomic within that partition. `query_nearest`
/// returns fragments of one context ordered by ascending vector distance.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_context(&self, context: &Context) -> Result<(), StoreError>;
    async fn get_context(&self, id: &str) -> Result<Option<Context>, StoreError>;
    async fn delete_context(&self, id: &str) -> Result<bool, StoreError>;

    async fn put_file(&self, file: &FileRecord) -> Result<(), StoreError>;
    /// Commit several file records in one atomic batch.
    async fn put_files_atomic(&self, files: &[FileRecord]) -> Result<(), StoreError>;
    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError>;
    async fn delete_file(&self, id: &str) -> Result<bool, StoreError>;

    /// Replace the whole fragment partition of a file in one atomic batch.
    async fn commit_fragments(
        &self,
        file_id: &str,
        fragments: Vec<Fragment>,
    ) -> Result<(), StoreError>;
    /// Drop a file's fragment partition; returns how many were removed.
    async fn delete_fragments(&self, file_id: &str) -> Result<usize, StoreError>;

    /// Top-K fragments of a context by ascending cosine distance, each hit
    /// carrying its distance to the query.
    async fn query_nearest(
        &self,
        context_id: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredFragment>, StoreError>;
}

/// In-memory store used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    contexts: HashMap<String, Context>,
    files: HashMap<String, FileRecord>,
    /// Fragment partitions keyed by file id.
    fragments: HashMap<String, Vec<Fragment>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All fragments of one file, in commit order.
    pub async fn fragments_of(&self, file_id: &str) -> Vec<Fragment> {
        self.inner
            .read()
            .await
            .fragments
            .get(file_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put_context(&self, context: &Context) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.contexts.insert(context.id.clone(), context.clone());
        Ok(())
    }

    async fn get_context(&self, id: &str) -> Result<Option<Context>, StoreError> {
        Ok(self.inner.read().await.contexts.get(id).cloned())
    }

    async fn delete_context(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.contexts.remove(id).is_some())
    }

    async fn put_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn put_files_atomic(&self, files: &[FileRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for file in files {
            inner.files.insert(file.id.clone(), file.clone());
        }
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.inner.read().await.files.get(id).cloned())
    }

    async fn delete_file(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.files.remove(id).is_some())
    }

    async fn commit_fragments(
        &self,
        file_id: &str,
        fragments: Vec<Fragment>,
    ) -> Result<(), StoreError> {
        debug_assert!(fragments.iter().all(|f| f.file == file_id));
        let mut inner = self.inner.write().await;
        inner.fragments.insert(file_id.to_string(), fragments);
        Ok(())
    }

    async fn delete_fragments(&self, file_id: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .fragments
            .remove(file_id)
            .map(|v| v.len())
            .unwrap_or(0))
    }

    async fn query_nearest(
        &self,
        context_id: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredFragment>, StoreError> {
        let inner = self.inner.read().await;
        let mut scored: Vec<(f32, &Fragment)> = inner
            .fragments
            .values()
            .flatten()
            .filter(|f| f.context == context_id)
            .map(|f| (cosine_distance(embedding, &f.embedding), f))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(distance, f)| ScoredFragment {
                fragment: f.clone(),
                distance,
            })
            .collect())
    }
}

/// Cosine distance in [0, 2]; degenerate vectors sort last.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return f32::MAX;
    }
    1.0 - dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fragment(context: &str, file: &str, ordinal: u32, embedding: Vec<f32>) -> Fragment {
        Fragment {
            id: crate::model::new_fragment_id(),
            context: context.to_string(),
            file: file.to_string(),
            page_index: 0,
            text: format!("fragment {ordinal}"),
            len: 10,
            embedding,
            ordinal,
        }
    }

    #[tokio::test]
    async fn context_round_trip() {
        let store = MemoryDocumentStore::new();
        let context = Context::new(NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"));
        store.put_context(&context).await.expect("put");
        let loaded = store
            .get_context(&context.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.id, context.id);
        assert!(store.delete_context(&context.id).await.expect("delete"));
        assert!(store.get_context(&context.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn commit_replaces_fragment_partition() {
        let store = MemoryDocumentStore::new();
        store
            .commit_fragments("file_a", vec![fragment("ctx", "file_a", 0, vec![1.0])])
            .await
            .expect("commit");
        store
            .commit_fragments(
                "file_a",
                vec![
                    fragment("ctx", "file_a", 0, vec![1.0]),
                    fragment("ctx", "file_a", 1, vec![0.5]),
                ],
            )
            .await
            .expect("recommit");
        assert_eq!(store.fragments_of("file_a").await.len(), 2);
        assert_eq!(store.delete_fragments("file_a").await.expect("delete"), 2);
        assert!(store.fragments_of("file_a").await.is_empty());
    }

    #[tokio::test]
    async fn query_orders_by_distance_and_filters_context() {
        let store = MemoryDocumentStore::new();
        store
            .commit_fragments(
                "file_a",
                vec![
                    fragment("ctx_one", "file_a", 0, vec![1.0, 0.0]),
                    fragment("ctx_one", "file_a", 1, vec![0.5, 0.5]),
                ],
            )
            .await
            .expect("commit");
        store
            .commit_fragments(
                "file_b",
                vec![fragment("ctx_two", "file_b", 0, vec![1.0, 0.0])],
            )
            .await
            .expect("commit");

        let hits = store
            .query_nearest("ctx_one", &[1.0, 0.0], 10)
            .await
            .expect("query");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].fragment.ordinal, 0, "exact match ranks first");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits.iter().all(|h| h.fragment.context == "ctx_one"));

        let limited = store
            .query_nearest("ctx_one", &[1.0, 0.0], 1)
            .await
            .expect("query");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn query_of_empty_context_is_empty() {
        let store = MemoryDocumentStore::new();
        let hits = store
            .query_nearest("ctx_none", &[1.0], 3)
            .await
            .expect("query");
        assert!(hits.is_empty());
    }

    #[test]
    fn cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0], &[0.0]), f32::MAX);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 2.0]), f32::MAX);
    }
}
