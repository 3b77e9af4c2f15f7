//! # docsift-embed
//!
//! Embedding generation for docsift.
//!
//! The pipeline only depends on the [`Embedder`](docsift_core::Embedder)
//! trait. This crate ships a deterministic local embedder, an optional
//! transformer embedder, and two decorators that wrap any other embedder:
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HashEmbedder`] | FNV-1a bag-of-words embedder, no model files required |
//! | `CandleEmbedder` | Sentence-transformer model via Candle (`candle` feature) |
//! | [`EmbedderPool`] | Concurrency limit, per-call timeout and output dimension check |
//! | [`EmbeddingCache`] | Content-hash keyed cache for repeated texts and queries |
//!
//! ## Usage
//!
//! ```rust
//! use docsift_core::{Embedder, EmbeddingConfig};
//! use docsift_embed::{EmbedderPool, EmbeddingCache, HashEmbedder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = EmbedderPool::new(Arc::new(HashEmbedder::new(384)), 2)
//!     .with_timeout(Duration::from_secs(30));
//! let cache = EmbeddingCache::with_capacity(Arc::new(pool), 1024);
//!
//! let output = cache.embed_query("quarterly report", &EmbeddingConfig::default()).await?;
//! assert_eq!(output.embedding.len(), 384);
//! # Ok(())
//! # }
//! ```

pub mod cache;
#[cfg(feature = "candle")]
pub mod candle;
pub mod hash;
pub mod pool;

pub use cache::{CacheStats, EmbeddingCache};
#[cfg(feature = "candle")]
pub use candle::{CandleEmbedder, DEFAULT_MODEL};
pub use hash::HashEmbedder;
pub use pool::EmbedderPool;
