//! Storage seams: the document store and the blob store.
//!
//! Both are traits so production deployments can bind managed backends;
//! the crate ships an in-memory document store and filesystem plus
//! in-memory blob stores.

pub mod blob;
pub mod document;

pub use blob::{BlobError, BlobMetadata, BlobStore, DurableWrite, FsBlobStore, MemoryBlobStore};
pub use document::{DocumentStore, MemoryDocumentStore, ScoredFragment, StoreError};
