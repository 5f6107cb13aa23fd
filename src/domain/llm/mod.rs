//! Completion provider domain models and traits

mod message;
mod provider;
mod registry;
mod request;
mod response;

pub use message::{Message, MessageRole};
pub use provider::{LlmProvider, LlmStream};
pub use registry::ProviderRegistry;
pub use request::{CompletionOptions, LlmRequest, LlmRequestBuilder};
pub use response::{FinishReason, LlmResponse, StreamChunk, Usage};

#[cfg(test)]
pub use provider::mock::MockLlmProvider;
