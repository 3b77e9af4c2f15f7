//! FNV-1a hash embedder.
//!
//! Produces deterministic (but non-semantic) embeddings from lexical overlap
//! alone. No model files and no inference, so it is:
//! - The default embedder when nothing else is configured
//! - The test double for pipeline integration tests
//!
//! Each lowercased token of two or more alphanumeric characters hashes to one
//! dimension and adds `±1` there, with the sign taken from the hash's high
//! bit. The result is L2-normalized, so cosine similarity is a dot product.

use async_trait::async_trait;
use docsift_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// FNV-1a offset basis (64-bit).
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a prime (64-bit).
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Tokens shorter than this are ignored.
const MIN_TOKEN_LEN: usize = 2;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 384;

/// Deterministic bag-of-words embedder.
///
/// # Example
///
/// ```rust
/// use docsift_embed::HashEmbedder;
///
/// let embedder = HashEmbedder::default();
/// let vector = embedder.embed_sync("hello world");
/// assert_eq!(vector.len(), 384);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of `dimension` values.
    ///
    /// A zero dimension is raised to one.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed one text without going through the async trait.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = self.token_counts(text);
        l2_normalize(&mut embedding);
        embedding
    }

    /// Signed token counts per dimension, before normalization.
    fn token_counts(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            let hash = fnv1a_hash(token.as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let index = (hash as usize) % self.dimension;
            let sign = if (hash >> 63) == 1 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }

        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "fnv1a-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        usize::MAX
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut embedding = self.token_counts(text);
                if config.normalize {
                    l2_normalize(&mut embedding);
                }
                EmbeddingOutput {
                    embedding,
                    token_count: tokenize(text).count(),
                }
            })
            .collect())
    }
}

/// Compute FNV-1a hash of a byte slice.
fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Lowercased tokens split on non-alphanumeric characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
}

fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
    if !norm_sq.is_finite() || norm_sq < f32::EPSILON {
        vec.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter_mut().for_each(|x| *x *= inv_norm);
}
