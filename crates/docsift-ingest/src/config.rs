//! Ingestion settings.

use docsift_core::EmbeddingConfig;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Number of jobs processed concurrently
    pub workers: usize,
    /// Jobs that may wait in the queue before `submit` applies backpressure
    pub queue_capacity: usize,
    /// Minimum non-whitespace characters for extracted text to count
    pub min_text_chars: usize,
    /// Limit for each extraction, embedding and upsert call
    pub capability_timeout: Duration,
    /// Retry policy for outcome writes and vector cleanup
    pub retry: RetryPolicy,
    /// Embedding configuration for document text
    pub embedding: EmbeddingConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            min_text_chars: 3,
            capability_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}
