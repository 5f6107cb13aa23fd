use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::DomainError;
use crate::domain::evaluation::EvaluationConfig;
use crate::domain::ingestion::ChunkingConfig;
use crate::domain::language::Language;
use crate::domain::rag::{ProviderSelection, RagConfig};
use crate::domain::retry::RetryPolicy;
use crate::infrastructure::embedding::EmbeddingProviderConfig;
use crate::infrastructure::llm::LlmProviderConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RagConfig,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub completion: CompletionSettings,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Where the vector index is kept between runs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// JSON snapshot loaded before ingestion and saved after it; the index
    /// lives only in memory when unset
    pub snapshot_path: Option<PathBuf>,
}

/// Embedding backend and call limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderConfig,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderConfig::default(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Named completion providers and the default selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub providers: BTreeMap<String, LlmProviderConfig>,
    /// Provider used when a query names none
    pub default_provider: String,
    pub fallback: Option<String>,
    /// Forces the prompt language instead of detecting it per question
    pub language: Option<Language>,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        let providers = BTreeMap::from([
            ("openai".to_string(), LlmProviderConfig::openai()),
            ("anthropic".to_string(), LlmProviderConfig::anthropic()),
            ("local".to_string(), LlmProviderConfig::ollama()),
        ]);

        Self {
            providers,
            default_provider: "openai".to_string(),
            fallback: None,
            language: None,
            timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

impl CompletionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Selection for `provider`, or the configured default
    pub fn selection(&self, provider: Option<&str>) -> ProviderSelection {
        let mut selection =
            ProviderSelection::new(provider.unwrap_or(&self.default_provider));

        if let Some(fallback) = &self.fallback {
            selection = selection.with_fallback(fallback);
        }
        if let Some(language) = self.language {
            selection = selection.with_language(language);
        }

        selection
    }

    /// Configurations of the providers a selection may use.
    ///
    /// Providers outside the selection are never built, so their API keys
    /// need not be present.
    pub fn providers_for(
        &self,
        selection: &ProviderSelection,
    ) -> Result<Vec<(&String, &LlmProviderConfig)>, DomainError> {
        std::iter::once(&selection.completion)
            .chain(selection.fallback.as_ref())
            .map(|name| {
                self.providers.get_key_value(name).ok_or_else(|| {
                    DomainError::invalid_config(format!(
                        "unknown completion provider '{}'; configured: {}",
                        name,
                        self.providers.keys().cloned().collect::<Vec<_>>().join(", ")
                    ))
                })
            })
            .collect()
    }
}

impl AppConfig {
    /// Layer `config/default`, `config/local`, then `DOCQA__*` variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("DOCQA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.evaluation.validate()?;

        if !self.completion.providers.contains_key(&self.completion.default_provider) {
            return Err(DomainError::invalid_config(format!(
                "default completion provider '{}' is not configured",
                self.completion.default_provider
            )));
        }

        Ok(())
    }
}
