//! Search query processing.

use docsift_core::{
    DocumentRecord, EmbedError, Embedder, EmbeddingConfig, Error, MetadataStore, Result,
    ScoredId, SearchHit, VectorIndex,
};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Search settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Result count when the caller gives none
    pub default_limit: usize,
    /// Upper bound on the result count
    pub max_limit: usize,
    /// Embedding configuration for query text
    pub embedding: EmbeddingConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Turns free-text queries into ranked documents.
pub struct SearchProcessor {
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
}

impl SearchProcessor {
    /// Create a new search processor.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: SearchConfig,
    ) -> Self {
        Self {
            metadata,
            index,
            embedder,
            config,
        }
    }

    /// Result count actually used for a requested `k`.
    #[must_use]
    pub fn effective_limit(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.config.default_limit)
            .min(self.config.max_limit)
    }

    /// Rank `COMPLETE` documents against `query`.
    ///
    /// Returns at most `k` hits, best first. Candidates whose record is gone
    /// or not `COMPLETE` are dropped, so fewer than `k` hits may come back.
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchHit>> {
        let text = query.trim();
        if text.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let limit = self.effective_limit(k);
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for {:?} (k = {})", text, limit);

        let embedding = self
            .embedder
            .embed_query(text, &self.config.embedding)
            .await?
            .embedding;

        let expected = self.index.dimension();
        if embedding.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }
            .into());
        }

        // The index breaks ties by id and knows nothing of record status, so
        // fetch past `limit` until the cut no longer falls inside a tie.
        let mut fetch = limit.saturating_add(1);
        let mut hits = loop {
            let candidates = self.index.query(&embedding, fetch).await?;
            let exhausted = candidates.len() < fetch || fetch == usize::MAX;
            let floor = candidates.last().map(|c| c.score);

            let mut hits = self.resolve(candidates).await?;
            rank_hits(&mut hits);

            let settled = match (hits.get(limit - 1), floor) {
                (Some(boundary), Some(floor)) => boundary.score > floor,
                _ => false,
            };
            if exhausted || settled {
                break hits;
            }
            debug!("Extending candidate fetch past {}", fetch);
            fetch = fetch.saturating_mul(2);
        };

        hits.truncate(limit);
        debug!("Found {} results", hits.len());
        Ok(hits)
    }

    /// Pair candidates with their records, dropping any that are not
    /// `COMPLETE` or have no record.
    async fn resolve(&self, candidates: Vec<ScoredId>) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.metadata.get(candidate.id).await? {
                Some(record) if record.is_searchable() => hits.push(SearchHit {
                    record,
                    score: candidate.score,
                }),
                Some(record) => {
                    debug!("Dropping {} candidate {}", record.status, record.id);
                }
                None => debug!("Dropping candidate {} with no record", candidate.id),
            }
        }
        Ok(hits)
    }
}

/// Best score first; ties go to the most recently updated record, then id.
fn rank_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| newest_first(&a.record, &b.record))
    });
}

fn newest_first(a: &DocumentRecord, b: &DocumentRecord) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.id.cmp(&b.id))
}
