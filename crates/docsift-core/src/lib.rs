//! # docsift-core
//!
//! Core types and traits for docsift, an asynchronous document ingestion and
//! semantic search pipeline.
//!
//! This crate provides the foundational abstractions used throughout docsift:
//!
//! - **Content Extraction**: [`ContentExtractor`] trait turning raw bytes of one format into text
//! - **Embedding Generation**: [`Embedder`] trait for converting text to vector embeddings
//! - **Metadata Storage**: [`MetadataStore`] trait holding one [`DocumentRecord`] per document
//! - **Vector Storage**: [`VectorIndex`] trait holding one [`VectorEntry`] per searchable document
//! - **Raw Bytes**: [`BlobStore`] trait keeping submitted bytes around for workers and resubmission
//! - **Job Lifecycle**: [`lifecycle`] rules deciding which status transitions are legal
//!
//! ## Architecture
//!
//! ```text
//! submit → MetadataStore (PENDING) → worker → ContentExtractor → Embedder
//!                                                                   ↓
//!                     MetadataStore (COMPLETE) ← VectorIndex upsert
//!
//! search → Embedder → VectorIndex query → MetadataStore lookup → SearchHit
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DocumentRecord`] | Metadata row tracking one submitted document |
//! | [`DocumentStatus`] | `PENDING`, `PROCESSING`, `COMPLETE` or `FAILED` |
//! | [`DocumentFormat`] | Closed set of supported input formats |
//! | [`VectorEntry`] | The embedding stored for one `COMPLETE` document |
//! | [`SearchHit`] | A ranked document with its similarity score |
//!
//! ## Consistency Contract
//!
//! A document has a vector entry if and only if its record is `COMPLETE`.
//! Workers uphold this by writing the vector *before* committing `COMPLETE`
//! and by removing any vector before committing `FAILED`. Status writes go
//! through [`MetadataStore::compare_and_swap`] so a transition is applied only
//! against the status it was computed from.
//!
//! ## Related Crates
//!
//! - `docsift-extract`: Format-specific extractors and the dispatch registry
//! - `docsift-embed`: Hash embedder, embedder pool and embedding cache
//! - `docsift-store`: In-memory and `LanceDB` stores
//! - `docsift-ingest`: Coordinator, state machine and worker pool
//! - `docsift-query`: Search query processing

pub mod error;
pub mod lifecycle;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, ExtractError, Result, StoreError};
pub use traits::*;
pub use types::*;
