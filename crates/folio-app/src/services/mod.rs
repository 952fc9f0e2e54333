//! Orchestration layer for IO-bound pipeline services.
//!
//! Modules exposed here coordinate external systems (stores, providers, rate
//! limiting) and must avoid embedding pure transforms. Keep stateless helpers
//! in `crate::pipeline` or `crate::pdf` so concurrency and resource
//! accounting stay localized.

pub mod chat;
pub mod citation;
pub mod contexts;
pub mod ingest;
pub mod progress;
pub mod retrieval;

pub use chat::{ChatError, ChatOutcome, ChatProvider, ChatService, ModelReply};
pub use citation::{CitationError, CitationResolver, CitationToken};
pub use contexts::{ContextError, ContextService, blob_key};
pub use ingest::{IngestError, IngestService};
pub use progress::{ProgressEvent, ProgressHandle, spawn_progress_writer};
pub use retrieval::{RetrievalEngine, RetrievalError};
