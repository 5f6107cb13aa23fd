//! OpenAI embedding provider implementation

use async_trait::async_trait;
use serde::Deserialize;

use super::HttpClientTrait;
use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const PROVIDER: &str = "openai";
const MAX_BATCH_SIZE: usize = 2048;

/// Known OpenAI embedding models and their dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Native dimension of a known model
pub fn model_dimension(model: &str) -> Option<usize> {
    EMBEDDING_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dims)| *dims)
}

/// OpenAI embedding provider
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    dimension: usize,
    /// Set when the caller asked for shortened vectors
    requested_dimension: Option<usize>,
    tag: String,
}

impl<C: HttpClientTrait> OpenAiEmbeddingProvider<C> {
    /// Create a new OpenAI embedding provider for `model`
    pub fn new(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Self::with_base_url(client, api_key, model, DEFAULT_OPENAI_BASE_URL)
    }

    /// Create a new provider with custom base URL
    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let model = model.into();
        let dimension = model_dimension(&model).ok_or_else(|| {
            DomainError::invalid_config(format!(
                "Unknown OpenAI embedding model '{model}'; set embedding.dimension explicitly"
            ))
        })?;

        Ok(Self {
            client,
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tag: format!("{PROVIDER}/{model}"),
            model,
            dimension,
            requested_dimension: None,
        })
    }

    /// Request vectors of `dimension` values (text-embedding-3 models only)
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self.requested_dimension = Some(dimension);
        self.tag = format!("{PROVIDER}/{}/{dimension}", self.model);
        self
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn build_request(&self, texts: &[String]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });

        if let Some(dims) = self.requested_dimension {
            body["dimensions"] = serde_json::json!(dims);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Vec<Vec<f32>>, DomainError> {
        let response: OpenAiEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::unavailable(PROVIDER, format!("Failed to parse embedding response: {e}"))
        })?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OpenAiEmbeddingProvider<C> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let url = self.embeddings_url();
        let body = self.build_request(texts);

        let response = self
            .client
            .post_json(PROVIDER, &url, self.headers(), &body)
            .await?;

        self.parse_response(response)
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

// OpenAI API types for embeddings

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
