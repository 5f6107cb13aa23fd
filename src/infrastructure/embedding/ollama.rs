//! Ollama embedding provider (`POST /api/embed`)

use async_trait::async_trait;
use serde::Deserialize;

use super::HttpClientTrait;
use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;

pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const PROVIDER: &str = "ollama";
const MAX_BATCH_SIZE: usize = 64;

/// Embedding model served by a local Ollama daemon.
///
/// Ollama does not report dimensions up front, so the caller supplies it.
#[derive(Debug)]
pub struct OllamaEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    base_url: String,
    model: String,
    dimension: usize,
    tag: String,
}

impl<C: HttpClientTrait> OllamaEmbeddingProvider<C> {
    pub fn new(client: C, model: impl Into<String>, dimension: usize) -> Self {
        Self::with_base_url(client, model, dimension, DEFAULT_OLLAMA_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        model: impl Into<String>,
        dimension: usize,
        base_url: impl Into<String>,
    ) -> Self {
        let model = model.into();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tag: format!("{PROVIDER}/{model}"),
            model,
            dimension,
        }
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OllamaEmbeddingProvider<C> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = self
            .client
            .post_json(
                PROVIDER,
                &self.embed_url(),
                vec![("Content-Type", "application/json")],
                &body,
            )
            .await?;

        let response: OllamaEmbedResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::unavailable(PROVIDER, format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(response.embeddings)
    }

    fn provider_tag(&self) -> &str {
        &self.tag
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
