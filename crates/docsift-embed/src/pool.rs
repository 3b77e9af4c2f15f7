//! Embedder pool for concurrent embedding operations.
//!
//! The pool wraps another [`Embedder`] and adds three guarantees:
//! - at most `max_concurrent` calls reach the inner embedder at once
//! - a call that exceeds the timeout fails with [`EmbedError::Timeout`]
//! - every returned vector has the advertised dimension

use async_trait::async_trait;
use docsift_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Pool of embedders with concurrency control.
pub struct EmbedderPool {
    /// Wrapped embedder
    embedder: Arc<dyn Embedder>,
    /// Semaphore to limit concurrent inference
    semaphore: Semaphore,
    /// Maximum concurrent operations
    max_concurrent: usize,
    /// Per-call time limit
    timeout: Option<Duration>,
}

impl EmbedderPool {
    /// Create a new embedder pool.
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            timeout: None,
        }
    }

    /// Fail calls that take longer than `timeout`, including time spent
    /// waiting for a permit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the underlying embedder.
    pub fn inner(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Get pool statistics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get max concurrent operations.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn embed_limited(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Unavailable(format!("semaphore error: {e}")))?;

        self.embedder.embed_text(texts, config).await
    }

    fn check_outputs(
        &self,
        expected_len: usize,
        outputs: &[EmbeddingOutput],
    ) -> Result<(), EmbedError> {
        if outputs.len() != expected_len {
            return Err(EmbedError::Inference(format!(
                "expected {expected_len} embeddings, got {}",
                outputs.len()
            )));
        }

        let dimension = self.embedder.dimension();
        if let Some(bad) = outputs.iter().find(|o| o.embedding.len() != dimension) {
            return Err(EmbedError::DimensionMismatch {
                expected: dimension,
                actual: bad.embedding.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for EmbedderPool {
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
        let outputs = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.embed_limited(texts, config))
                .await
                .map_err(|_| {
                    warn!("Embedding {} texts timed out after {:?}", texts.len(), limit);
                    EmbedError::Timeout(limit)
                })??,
            None => self.embed_limited(texts, config).await?,
        };

        self.check_outputs(texts.len(), &outputs)?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_DIM: usize = 384;

    // ==================== Mock Embedder ====================

    struct MockEmbedder {
        dimension: usize,
        output_dimension: usize,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockEmbedder {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                output_dimension: dimension,
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_wrong_output(mut self, output_dimension: usize) -> Self {
            self.output_dimension = output_dimension;
            self
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn model_name(&self) -> &str {
            "mock-embedder"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_tokens(&self) -> usize {
            512
        }

        async fn embed_text(
            &self,
            texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(texts
                .iter()
                .map(|text| EmbeddingOutput {
                    embedding: (0..self.output_dimension)
                        .map(|i| ((i + text.len()) as f32 * 0.001).sin())
                        .collect(),
                    token_count: text.split_whitespace().count(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = EmbedderPool::new(Arc::new(MockEmbedder::new(TEST_DIM)), 4);

        assert_eq!(pool.dimension(), TEST_DIM);
        assert_eq!(pool.model_name(), "mock-embedder");
        assert_eq!(pool.max_concurrent(), 4);
        assert_eq!(pool.available_permits(), 4);
        assert_eq!(pool.inner().dimension(), TEST_DIM);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_raised() {
        let pool = EmbedderPool::new(Arc::new(MockEmbedder::new(TEST_DIM)), 0);
        assert_eq!(pool.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let pool = EmbedderPool::new(Arc::new(MockEmbedder::new(TEST_DIM)), 4);
        let config = EmbeddingConfig::default();

        let results = pool
            .embed_text(&["hello world", "test embedding"], &config)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].embedding.len(), TEST_DIM);
    }

    #[tokio::test]
    async fn test_embed_query() {
        let pool = EmbedderPool::new(Arc::new(MockEmbedder::new(TEST_DIM)), 4);

        let result = pool
            .embed_query("search query", &EmbeddingConfig::default())
            .await
            .unwrap();

        assert_eq!(result.embedding.len(), TEST_DIM);
        assert_eq!(result.token_count, 2);
    }

    #[tokio::test]
    async fn test_semaphore_limits_concurrency() {
        let embedder = Arc::new(MockEmbedder::new(TEST_DIM).with_delay(Duration::from_millis(20)));
        let pool = Arc::new(EmbedderPool::new(
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            2,
        ));

        let mut handles = Vec::new();
        for i in 0..6 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let text = format!("query {i}");
                pool.embed_query(&text, &EmbeddingConfig::default()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        let embedder = MockEmbedder::new(TEST_DIM).with_delay(Duration::from_millis(200));
        let pool = EmbedderPool::new(Arc::new(embedder), 1).with_timeout(Duration::from_millis(10));

        let err = pool
            .embed_text(&["slow"], &EmbeddingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let embedder = MockEmbedder::new(TEST_DIM).with_wrong_output(128);
        let pool = EmbedderPool::new(Arc::new(embedder), 1);

        let err = pool
            .embed_text(&["text"], &EmbeddingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: TEST_DIM,
                actual: 128
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = EmbedderPool::new(Arc::new(MockEmbedder::new(TEST_DIM)), 4);
        let texts: Vec<&str> = vec![];
        let results = pool
            .embed_text(&texts, &EmbeddingConfig::default())
            .await
            .unwrap();

        assert!(results.is_empty());
    }
}
