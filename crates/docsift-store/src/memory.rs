//! In-memory stores for testing without `LanceDB`.
//!
//! This module provides in-memory implementations of every storage trait.
//! They are useful for:
//! - Testing without the `LanceDB` dependency
//! - Running the pipeline with `storage.backend = "memory"`
//! - Unit tests that don't need persistence

use async_trait::async_trait;
use docsift_core::{
    BlobStore, CasOutcome, DocumentRecord, DocumentStatus, MetadataStore, ScoredId, StatusCounts,
    StoreError, VectorEntry, VectorIndex,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Compute cosine similarity between two vectors.
///
/// Returns `0.0` for vectors of different length or with zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Order candidates best first, breaking score ties by id.
pub(crate) fn rank_candidates(candidates: &mut [ScoredId]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ============================================================================
// Metadata
// ============================================================================

/// In-memory document record store.
///
/// Conditional writes hold the write lock for the whole
/// compare-and-replace, so concurrent transitions on one id serialize.
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Arc<RwLock<HashMap<Uuid, DocumentRecord>>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn init(&self) -> Result<(), StoreError> {
        debug!("MemoryMetadataStore initialized");
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        debug!("Inserted record {}", record.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected: DocumentStatus,
        record: &DocumentRecord,
    ) -> Result<CasOutcome, StoreError> {
        let mut records = self.records.write().await;
        let Some(current) = records.get_mut(&record.id) else {
            return Ok(CasOutcome::NotFound);
        };
        if current.status != expected {
            return Ok(CasOutcome::Conflict(current.status));
        }
        *current = record.clone();
        Ok(CasOutcome::Applied)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.remove(&id).is_some())
    }

    async fn list(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matching: Vec<DocumentRecord> = records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let records = self.records.read().await;
        let mut counts = StatusCounts::default();
        for record in records.values() {
            counts.add(record.status);
        }
        Ok(counts)
    }
}

// ============================================================================
// Vectors
// ============================================================================

/// In-memory vector index.
///
/// Search is brute-force cosine similarity. It's not suitable for large
/// collections but is perfect for testing and development.
pub struct MemoryVectorIndex {
    dimension: usize,
    entries: Arc<RwLock<HashMap<Uuid, VectorEntry>>>,
}

impl MemoryVectorIndex {
    /// Create an empty index for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn init(&self) -> Result<(), StoreError> {
        debug!("MemoryVectorIndex initialized (dimension: {})", self.dimension);
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, entry: &VectorEntry) -> Result<(), StoreError> {
        if entry.vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: entry.vector.len(),
            });
        }
        let mut entries = self.entries.write().await;
        entries.insert(entry.id, entry.clone());
        debug!("Upserted vector for {}", entry.id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(&id).is_some())
    }

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(&id))
    }

    async fn ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.keys().copied().collect())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredId>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let entries = self.entries.read().await;
        let mut candidates: Vec<ScoredId> = entries
            .values()
            .map(|entry| ScoredId {
                id: entry.id,
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        rank_candidates(&mut candidates);
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.len() as u64)
    }
}

// ============================================================================
// Blobs
// ============================================================================

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<Uuid, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Create an empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: Uuid, data: &[u8]) -> Result<(), StoreError> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(id, data.to_vec());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut blobs = self.blobs.write().await;
        Ok(blobs.remove(&id).is_some())
    }
}
