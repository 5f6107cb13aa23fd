use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::hashing::DEFAULT_HASHING_DIMENSION;
use super::ollama::DEFAULT_OLLAMA_EMBEDDING_MODEL;
use super::openai::DEFAULT_OPENAI_EMBEDDING_MODEL;
use super::{HashingEmbeddingProvider, OllamaEmbeddingProvider, OpenAiEmbeddingProvider};
use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;
use crate::infrastructure::llm::{ApiKeys, HttpClient};

/// Embedding backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingProviderConfig {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        dimension: Option<usize>,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_model")]
        model: String,
        dimension: usize,
        #[serde(default)]
        base_url: Option<String>,
    },
    Hashing {
        #[serde(default = "default_hashing_dimension")]
        dimension: usize,
    },
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string()
}

fn default_hashing_dimension() -> usize {
    DEFAULT_HASHING_DIMENSION
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self::Hashing {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

/// Factory for creating embedding providers
#[derive(Debug)]
pub struct EmbeddingProviderFactory;

impl EmbeddingProviderFactory {
    pub fn create(
        config: &EmbeddingProviderConfig,
        keys: &ApiKeys,
        timeout: Duration,
    ) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
        match config {
            EmbeddingProviderConfig::OpenAi {
                model,
                dimension,
                base_url,
            } => {
                let api_key = keys
                    .openai
                    .as_deref()
                    .ok_or_else(|| DomainError::invalid_config("OPENAI_API_KEY is not set"))?;
                let client = HttpClient::with_timeout(timeout)?;

                let provider = match base_url {
                    Some(url) => OpenAiEmbeddingProvider::with_base_url(client, api_key, model, url)?,
                    None => OpenAiEmbeddingProvider::new(client, api_key, model)?,
                };

                Ok(match dimension {
                    Some(dimension) => Arc::new(provider.with_dimension(*dimension)),
                    None => Arc::new(provider),
                })
            }

            EmbeddingProviderConfig::Ollama {
                model,
                dimension,
                base_url,
            } => {
                let client = HttpClient::with_timeout(timeout)?;

                Ok(Arc::new(match base_url {
                    Some(url) => OllamaEmbeddingProvider::with_base_url(client, model, *dimension, url),
                    None => OllamaEmbeddingProvider::new(client, model, *dimension),
                }))
            }

            EmbeddingProviderConfig::Hashing { dimension } => {
                Ok(Arc::new(HashingEmbeddingProvider::new(*dimension)?))
            }
        }
    }
}
