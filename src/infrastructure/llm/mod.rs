//! Completion provider implementations

mod anthropic;
mod factory;
mod http_client;
mod ollama;
mod openai;
mod stream;

pub use anthropic::AnthropicProvider;
pub use factory::{ApiKeys, LlmProviderConfig, LlmProviderFactory};
pub use http_client::{ByteStream, HttpClient, HttpClientTrait, status_error};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

#[cfg(test)]
pub use http_client::mock::MockHttpClient;
