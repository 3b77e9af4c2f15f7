//! Core traits for docsift components.
//!
//! This module defines the capability and storage interfaces the pipeline is
//! assembled from:
//!
//! - [`ContentExtractor`]: Turn raw bytes of one format into text
//! - [`Embedder`]: Generate vector embeddings
//! - [`MetadataStore`]: Persist document records with conditional status writes
//! - [`VectorIndex`]: Store and query one vector per document
//! - [`BlobStore`]: Keep submitted bytes for workers and resubmission
//!
//! Implementations are held as `Arc<dyn Trait>` so tests can substitute
//! deterministic fakes for every capability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EmbedError, ExtractError, StoreError};
use crate::types::{
    CasOutcome, DocumentFormat, DocumentRecord, DocumentStatus, EmbeddingConfig,
    EmbeddingOutput, ExtractedContent, ScoredId, StatusCounts, VectorEntry,
};

// ============================================================================
// Content Extraction
// ============================================================================

/// Trait for extracting text from the bytes of one document format.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// The format this extractor handles.
    fn format(&self) -> DocumentFormat;

    /// Extractor name, used in logs.
    fn name(&self) -> &str;

    /// Extract content from raw document bytes.
    async fn extract(&self, data: &[u8]) -> Result<ExtractedContent, ExtractError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum tokens per input.
    fn max_tokens(&self) -> usize;

    /// Embed text content.
    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a query (may use different instruction).
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query], config).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

// ============================================================================
// Metadata Storage
// ============================================================================

/// Trait for persisting document records.
///
/// Status changes go through [`compare_and_swap`](MetadataStore::compare_and_swap)
/// so that a transition computed from a stale read is never applied.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Initialize the store.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the id exists.
    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError>;

    /// Replace the record only if its stored status equals `expected`.
    async fn compare_and_swap(
        &self,
        expected: DocumentStatus,
        record: &DocumentRecord,
    ) -> Result<CasOutcome, StoreError>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// List records, optionally restricted to one status, oldest first.
    async fn list(&self, status: Option<DocumentStatus>)
        -> Result<Vec<DocumentRecord>, StoreError>;

    /// Count records per status.
    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for record in self.list(None).await? {
            counts.add(record.status);
        }
        Ok(counts)
    }
}

// ============================================================================
// Vector Storage
// ============================================================================

/// Trait for storing one vector per document and querying by similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Initialize the index.
    async fn init(&self) -> Result<(), StoreError>;

    /// Dimension every stored vector must have.
    fn dimension(&self) -> usize;

    /// Insert or replace the vector for `entry.id`.
    async fn upsert(&self, entry: &VectorEntry) -> Result<(), StoreError>;

    /// Remove the vector for `id`. Returns whether one existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Whether a vector exists for `id`.
    async fn contains(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All ids with a stored vector.
    async fn ids(&self) -> Result<Vec<Uuid>, StoreError>;

    /// The `k` nearest vectors by cosine similarity, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredId>, StoreError>;

    /// Number of stored vectors.
    async fn count(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// Raw Bytes
// ============================================================================

/// Trait for keeping the bytes of submitted documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `id`, replacing any previous bytes.
    async fn put(&self, id: Uuid, data: &[u8]) -> Result<(), StoreError>;

    /// Fetch the bytes for `id`.
    async fn get(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove the bytes for `id`. Returns whether they existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}
