//! Batching, timeout and rate-limit handling around an embedding provider

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{EmbeddingProvider, EmbeddingVector};
use crate::domain::DomainError;
use crate::domain::index::VectorIndex;
use crate::domain::ingestion::Chunk;
use crate::domain::retry::{RetryOn, RetryPolicy};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Wraps an [`EmbeddingProvider`] with the guarantees callers rely on:
/// inputs are split into sub-batches, results come back in input order,
/// each call is bounded by a timeout, and only `RateLimited` is retried.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the retry policy; it always retries rate limiting only
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry.with_retry_on(RetryOn::RateLimited);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_tag(&self) -> &str {
        self.provider.provider_tag()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Fail with `DimensionMismatch` unless `index` accepts this embedder's vectors
    pub fn ensure_compatible(&self, index: &dyn VectorIndex) -> Result<(), DomainError> {
        if self.dimension() != index.dimension() {
            return Err(DomainError::dimension_mismatch(
                index.dimension(),
                self.dimension(),
            ));
        }

        if self.provider_tag() != index.provider_tag() {
            return Err(DomainError::dimension_mismatch(
                index.provider_tag(),
                self.provider_tag(),
            ));
        }

        Ok(())
    }

    /// Embed texts, one vector per input in input order
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, DomainError> {
        let batch_size = self.provider.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(batch_size).enumerate() {
            debug!(
                provider = self.provider_tag(),
                batch = index,
                size = batch.len(),
                "Embedding batch"
            );

            let values = self.embed_batch(batch).await?;
            vectors.extend(
                values
                    .into_iter()
                    .map(|v| EmbeddingVector::new(v, self.provider_tag())),
            );
        }

        Ok(vectors)
    }

    /// Embed a single query text
    pub async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, DomainError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::unavailable(self.provider_tag(), "empty embedding response"))
    }

    /// Embed chunk texts and tag each vector with its chunk id
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddingVector>, DomainError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        Ok(vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| vector.with_chunk_id(chunk.id.as_str()))
            .collect())
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let tag = self.provider_tag();
        let provider = &self.provider;
        let timeout = self.timeout;

        let values = self
            .retry
            .run("embed", move || async move {
                tokio::time::timeout(timeout, provider.embed_batch(batch))
                    .await
                    .map_err(|_| {
                        DomainError::unavailable(
                            tag,
                            format!("embedding timed out after {timeout:?}"),
                        )
                    })?
            })
            .await?;

        if values.len() != batch.len() {
            return Err(DomainError::unavailable(
                tag,
                format!(
                    "returned {} vectors for {} inputs",
                    values.len(),
                    batch.len()
                ),
            ));
        }

        let dimension = self.dimension();
        if let Some(bad) = values.iter().find(|v| v.len() != dimension) {
            return Err(DomainError::dimension_mismatch(dimension, bad.len()));
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text number {i}")).collect()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3).with_initial_delay(1).with_max_delay(5)
    }

    #[tokio::test]
    async fn test_splits_into_sub_batches_and_keeps_order() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 32).with_max_batch_size(4));
        let embedder = Embedder::new(provider.clone());

        let inputs = texts(10);
        let vectors = embedder.embed(&inputs).await.unwrap();

        assert_eq!(provider.batch_sizes(), vec![4, 4, 2]);
        assert_eq!(vectors.len(), 10);
        for (vector, text) in vectors.iter().zip(&inputs) {
            assert_eq!(vector.values, provider.vector_for(text));
            assert_eq!(vector.provider_tag, "mock");
            assert_eq!(vector.dimension, 32);
        }
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8));
        let embedder = Embedder::new(provider.clone());

        assert!(embedder.embed(&[]).await.unwrap().is_empty());
        assert!(provider.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_retries_rate_limited() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8).with_failures(vec![
            DomainError::rate_limited("mock", None),
            DomainError::rate_limited("mock", Some(Duration::from_millis(1))),
        ]));
        let embedder = Embedder::new(provider.clone()).with_retry(fast_retry());

        let vectors = embedder.embed(&texts(2)).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(provider.batch_sizes().len(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_is_not_retried() {
        let provider = Arc::new(
            MockEmbeddingProvider::new("mock", 8)
                .with_failures(vec![DomainError::unavailable("mock", "connection refused")]),
        );
        let embedder = Embedder::new(provider.clone()).with_retry(
            fast_retry().with_retry_on(RetryOn::Transient),
        );

        let result = embedder.embed(&texts(1)).await;

        assert!(matches!(result, Err(DomainError::ProviderUnavailable { .. })));
        assert_eq!(provider.batch_sizes().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let provider =
            Arc::new(MockEmbeddingProvider::new("mock", 8).with_delay(Duration::from_millis(200)));
        let embedder = Embedder::new(provider).with_timeout(Duration::from_millis(10));

        let result = embedder.embed_query("slow").await;
        assert!(matches!(result, Err(DomainError::ProviderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_wrong_vector_count_is_rejected() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8).with_truncated_output());
        let embedder = Embedder::new(provider);

        let result = embedder.embed(&texts(3)).await;
        assert!(matches!(result, Err(DomainError::ProviderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_embed_chunks_sets_chunk_ids() {
        use crate::domain::ingestion::{ChunkingStrategy, ChunkingConfig, Document};
        use crate::infrastructure::ingestion::RecursiveChunker;

        let document = Document::new("a.md", "First paragraph.\n\nSecond paragraph.");
        let chunks = RecursiveChunker::new()
            .chunk(&document, &ChunkingConfig::new(20, 0))
            .unwrap();

        let embedder = Embedder::new(Arc::new(MockEmbeddingProvider::new("mock", 8)));
        let vectors = embedder.embed_chunks(&chunks).await.unwrap();

        assert_eq!(vectors.len(), chunks.len());
        for (vector, chunk) in vectors.iter().zip(&chunks) {
            assert_eq!(vector.chunk_id.as_deref(), Some(chunk.id.as_str()));
        }
    }
}
