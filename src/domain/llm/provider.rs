use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use super::response::StreamChunk;
use super::{LlmRequest, LlmResponse};
use crate::domain::DomainError;

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, DomainError>> + Send>>;

/// Trait for completion providers (OpenAI, Anthropic, Ollama)
///
/// A provider is bound to one model. It never substitutes another provider;
/// fallback is decided by the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Run a blocking completion and return the full answer
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, DomainError>;

    /// Start a streaming completion.
    ///
    /// The stream is lazy and finite: it yields text deltas and ends with a
    /// chunk carrying a finish reason. Dropping it aborts the request.
    async fn stream_complete(&self, request: LlmRequest) -> Result<LlmStream, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Model this provider sends requests to
    fn model(&self) -> &str;
}
