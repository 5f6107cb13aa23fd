use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Message, MessageRole};
use crate::domain::DomainError;

/// Sampling options shared by every completion provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stop_sequences: BTreeSet<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            stop_sequences: BTreeSet::new(),
        }
    }
}

impl CompletionOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.insert(stop.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(DomainError::invalid_config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }

        if self.max_tokens == 0 {
            return Err(DomainError::invalid_config(
                "max_tokens must be greater than 0",
            ));
        }

        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(DomainError::invalid_config("stop sequences must not be empty"));
        }

        Ok(())
    }

    pub fn stop_list(&self) -> Vec<&str> {
        self.stop_sequences.iter().map(String::as_str).collect()
    }
}

/// A completion request: system instruction, prior turns and the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: CompletionOptions,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            options: CompletionOptions::default(),
        }
    }

    pub fn builder() -> LlmRequestBuilder {
        LlmRequestBuilder::new()
    }

    /// Concatenated system messages, for providers that take the system prompt separately
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Messages without the system role
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != MessageRole::System)
    }
}

/// Builder for LlmRequest
#[derive(Debug, Default)]
pub struct LlmRequestBuilder {
    messages: Vec<Message>,
    options: CompletionOptions,
}

impl LlmRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(Message::system(content))
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(Message::user(content))
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.message(Message::assistant(content))
    }

    pub fn options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> LlmRequest {
        LlmRequest {
            messages: self.messages,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::builder()
            .system("Answer from the context only")
            .user("Hello!")
            .options(CompletionOptions::default().with_temperature(0.7).with_max_tokens(100))
            .build();

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.options.temperature, 0.7);
        assert_eq!(request.options.max_tokens, 100);
    }

    #[test]
    fn test_system_text_and_conversation() {
        let request = LlmRequest::builder()
            .system("rules")
            .user("q1")
            .assistant("a1")
            .user("q2")
            .build();

        assert_eq!(request.system_text().as_deref(), Some("rules"));
        assert_eq!(request.conversation().count(), 3);
        assert_eq!(LlmRequest::new(vec![Message::user("x")]).system_text(), None);
    }

    #[test]
    fn test_options_defaults_and_validation() {
        let options = CompletionOptions::default();
        assert_eq!(options.temperature, 0.0);
        assert_eq!(options.max_tokens, 1024);
        assert!(options.validate().is_ok());

        assert!(CompletionOptions::default().with_temperature(3.0).validate().is_err());
        assert!(CompletionOptions::default().with_max_tokens(0).validate().is_err());
        assert!(CompletionOptions::default().with_stop_sequence("").validate().is_err());
    }

    #[test]
    fn test_stop_sequences_are_a_set() {
        let options = CompletionOptions::default()
            .with_stop_sequence("END")
            .with_stop_sequence("END")
            .with_stop_sequence("\n\n");

        assert_eq!(options.stop_list(), vec!["\n\n", "END"]);
    }
}
