//! Storage backends for docsift.
//!
//! This crate implements the three storage traits from `docsift-core`:
//!
//! | Trait | In-memory | Persistent |
//! |-------|-----------|------------|
//! | [`MetadataStore`](docsift_core::MetadataStore) | [`MemoryMetadataStore`] | [`LanceStore`] |
//! | [`VectorIndex`](docsift_core::VectorIndex) | [`MemoryVectorIndex`] | [`LanceStore`] |
//! | [`BlobStore`](docsift_core::BlobStore) | [`MemoryBlobStore`] | [`FsBlobStore`] |
//!
//! The `LanceDB` backend is behind the `lancedb` feature (enabled by default).
//!
//! # Example
//!
//! ```rust
//! use docsift_core::{DocumentFormat, DocumentRecord, MetadataStore};
//! use docsift_store::MemoryMetadataStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryMetadataStore::new();
//! store.init().await?;
//!
//! let record = DocumentRecord::new("notes.txt", DocumentFormat::PlainText, b"hello");
//! store.insert(&record).await?;
//! assert!(store.get(record.id).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod blob;
#[cfg(feature = "lancedb")]
pub mod lancedb;
pub mod memory;
#[cfg(feature = "lancedb")]
pub mod schema;

pub use blob::FsBlobStore;
#[cfg(feature = "lancedb")]
pub use lancedb::LanceStore;
pub use memory::{cosine_similarity, MemoryBlobStore, MemoryMetadataStore, MemoryVectorIndex};
