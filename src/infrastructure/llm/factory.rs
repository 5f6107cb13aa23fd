use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::anthropic::DEFAULT_ANTHROPIC_MODEL;
use super::http_client::HttpClient;
use super::ollama::{DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL};
use super::openai::DEFAULT_OPENAI_MODEL;
use super::{AnthropicProvider, OllamaProvider, OpenAiProvider};
use crate::domain::retry::RetryPolicy;
use crate::domain::{DomainError, LlmProvider, ProviderRegistry};

/// Completion provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmProviderConfig {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default = "default_ollama_base_url")]
        base_url: String,
    },
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.to_string()
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_ollama_base_url() -> String {
    DEFAULT_OLLAMA_BASE_URL.to_string()
}

impl LlmProviderConfig {
    pub fn openai() -> Self {
        Self::OpenAi {
            model: default_openai_model(),
            base_url: None,
        }
    }

    pub fn anthropic() -> Self {
        Self::Anthropic {
            model: default_anthropic_model(),
            base_url: None,
        }
    }

    pub fn ollama() -> Self {
        Self::Ollama {
            model: default_ollama_model(),
            base_url: default_ollama_base_url(),
        }
    }
}

/// API keys for the remote providers, read from the process environment
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            openai: read("OPENAI_API_KEY"),
            anthropic: read("ANTHROPIC_API_KEY"),
        }
    }
}

/// Factory for creating completion providers
#[derive(Debug)]
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create a completion provider from configuration
    pub fn create(
        config: &LlmProviderConfig,
        keys: &ApiKeys,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let http_client = HttpClient::with_timeout(timeout)?;

        match config {
            LlmProviderConfig::OpenAi { model, base_url } => {
                let api_key = Self::require_key(keys.openai.as_deref(), "OPENAI_API_KEY")?;
                let provider = match base_url {
                    Some(url) => OpenAiProvider::with_base_url(http_client, api_key, url),
                    None => OpenAiProvider::new(http_client, api_key),
                };
                Ok(Arc::new(provider.with_model(model).with_retry(retry)))
            }

            LlmProviderConfig::Anthropic { model, base_url } => {
                let api_key = Self::require_key(keys.anthropic.as_deref(), "ANTHROPIC_API_KEY")?;
                let provider = match base_url {
                    Some(url) => AnthropicProvider::with_base_url(http_client, api_key, url),
                    None => AnthropicProvider::new(http_client, api_key),
                };
                Ok(Arc::new(provider.with_model(model).with_retry(retry)))
            }

            LlmProviderConfig::Ollama { model, base_url } => {
                let provider = OllamaProvider::with_base_url(http_client, base_url)
                    .with_model(model)
                    .with_retry(retry);
                Ok(Arc::new(provider))
            }
        }
    }

    /// Build a registry with one provider per named configuration entry
    pub fn create_registry<'a>(
        configs: impl IntoIterator<Item = (&'a String, &'a LlmProviderConfig)>,
        keys: &ApiKeys,
        timeout: Duration,
        retry: &RetryPolicy,
    ) -> Result<ProviderRegistry, DomainError> {
        let mut registry = ProviderRegistry::new();

        for (name, config) in configs {
            let provider = Self::create(config, keys, timeout, retry.clone())?;
            registry.register(name, provider);
        }

        Ok(registry)
    }

    fn require_key<'a>(key: Option<&'a str>, variable: &str) -> Result<&'a str, DomainError> {
        key.ok_or_else(|| DomainError::invalid_config(format!("{variable} is not set")))
    }
}
