//! Embedding cache.
//!
//! Keeps recent embeddings keyed by a blake3 digest of the input. Queries and
//! document texts are keyed separately since an embedder may embed a query
//! differently from a document with the same text. The search path wraps its
//! embedder in a cache so repeated queries skip the model.

use async_trait::async_trait;
use docsift_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

/// Default maximum number of entries in the cache.
const DEFAULT_CACHE_SIZE: usize = 1024;

#[derive(Clone, Copy)]
enum InputKind {
    Text,
    Query,
}

impl InputKind {
    fn tag(self) -> &'static [u8] {
        match self {
            Self::Text => b"text",
            Self::Query => b"query",
        }
    }
}

struct Slot {
    output: EmbeddingOutput,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<blake3::Hash, Slot>,
    clock: u64,
    stats: CacheStats,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, key: &blake3::Hash) -> Option<EmbeddingOutput> {
        let now = self.tick();
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.last_used = now;
                self.stats.hits += 1;
                Some(slot.output.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, key: blake3::Hash, output: EmbeddingOutput, capacity: usize) {
        let now = self.tick();
        if !self.slots.contains_key(&key) && self.slots.len() >= capacity {
            let oldest = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.slots.remove(&oldest);
                self.stats.evictions += 1;
            }
        }
        self.slots.insert(
            key,
            Slot {
                output,
                last_used: now,
            },
        );
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Least-recently-used cache in front of an [`Embedder`].
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl EmbeddingCache {
    /// Cache with the default capacity.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_capacity(embedder, DEFAULT_CACHE_SIZE)
    }

    /// Cache holding at most `capacity` embeddings (at least one).
    pub fn with_capacity(embedder: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            embedder,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn key(kind: InputKind, input: &str, config: &EmbeddingConfig) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.tag());
        hasher.update(&[u8::from(config.normalize)]);
        if let Some(instruction) = &config.instruction {
            hasher.update(instruction.as_bytes());
        }
        hasher.update(&[0]);
        hasher.update(input.as_bytes());
        hasher.finalize()
    }

    /// The wrapped embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats
    }

    /// Number of cached embeddings.
    pub async fn size(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    /// Drop every cached embedding. Statistics are kept.
    pub async fn clear(&self) {
        self.state.lock().await.slots.clear();
    }
}

#[async_trait]
impl Embedder for EmbeddingCache {
    fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn max_tokens(&self) -> usize {
        self.embedder.max_tokens()
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let keys: Vec<blake3::Hash> = texts
            .iter()
            .map(|text| Self::key(InputKind::Text, text, config))
            .collect();

        let mut outputs: Vec<Option<EmbeddingOutput>> = {
            let mut state = self.state.lock().await;
            keys.iter().map(|key| state.get(key)).collect()
        };

        let missing: Vec<usize> = (0..texts.len()).filter(|&i| outputs[i].is_none()).collect();
        if !missing.is_empty() {
            trace!("Embedding {} of {} texts", missing.len(), texts.len());
            let inputs: Vec<&str> = missing.iter().map(|&i| texts[i]).collect();
            let fresh = self.embedder.embed_text(&inputs, config).await?;
            if fresh.len() != inputs.len() {
                return Err(EmbedError::Inference(format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    fresh.len()
                )));
            }

            let mut state = self.state.lock().await;
            for (i, output) in missing.into_iter().zip(fresh) {
                state.put(keys[i], output.clone(), self.capacity);
                outputs[i] = Some(output);
            }
        }

        Ok(outputs.into_iter().flatten().collect())
    }

    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let key = Self::key(InputKind::Query, query, config);
        if let Some(output) = self.state.lock().await.get(&key) {
            return Ok(output);
        }

        let output = self.embedder.embed_query(query, config).await?;
        self.state
            .lock()
            .await
            .put(key, output.clone(), self.capacity);
        Ok(output)
    }
}
