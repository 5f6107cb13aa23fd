use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http_client::HttpClientTrait;
use super::stream::decode;
use crate::domain::retry::{RetryOn, RetryPolicy};
use crate::domain::{
    DomainError, FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message,
    StreamChunk, Usage,
};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
const PROVIDER: &str = "ollama";

/// Local model served by an Ollama daemon
#[derive(Debug)]
pub struct OllamaProvider<C: HttpClientTrait> {
    client: C,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl<C: HttpClientTrait> OllamaProvider<C> {
    pub fn new(client: C) -> Self {
        Self::with_base_url(client, DEFAULT_OLLAMA_BASE_URL)
    }

    pub fn with_base_url(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            retry: RetryPolicy::default().with_retry_on(RetryOn::Transient),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry.with_retry_on(RetryOn::Transient);
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn build_request(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<OllamaMessage> = request
            .messages
            .iter()
            .map(OllamaMessage::from_domain)
            .collect();

        let options = &request.options;
        let mut model_options = serde_json::json!({
            "temperature": options.temperature,
            "num_predict": options.max_tokens,
        });

        if !options.stop_sequences.is_empty() {
            model_options["stop"] = serde_json::json!(options.stop_list());
        }

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "options": model_options,
        })
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![("Content-Type", "application/json")]
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for OllamaProvider<C> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        request.options.validate()?;

        let url = self.chat_url();
        let body = self.build_request(&request, false);
        let (client, url, body, headers) = (&self.client, &url, &body, self.headers());

        let json = self
            .retry
            .run("ollama.complete", move || {
                let headers = headers.clone();
                async move { client.post_json(PROVIDER, url, headers, body).await }
            })
            .await?;

        let response: OllamaChatResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::unavailable(PROVIDER, format!("Failed to parse response: {e}"))
        })?;

        if let Some(error) = response.error {
            return Err(DomainError::unavailable(PROVIDER, error));
        }

        let content = response.message.map(|m| m.content).unwrap_or_default();
        let finish_reason = response
            .done_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or(FinishReason::Stop);

        let mut llm_response = LlmResponse::new(
            response.created_at.unwrap_or_default(),
            response.model.unwrap_or_else(|| self.model.clone()),
            Message::assistant(content),
        )
        .with_finish_reason(finish_reason);

        if let (Some(prompt), Some(completion)) = (response.prompt_eval_count, response.eval_count)
        {
            llm_response = llm_response.with_usage(Usage::new(prompt, completion));
        }

        Ok(llm_response)
    }

    async fn stream_complete(&self, request: LlmRequest) -> Result<LlmStream, DomainError> {
        request.options.validate()?;

        let url = self.chat_url();
        let body = self.build_request(&request, true);
        let (client, url, body, headers) = (&self.client, &url, &body, self.headers());

        let byte_stream = self
            .retry
            .run("ollama.stream", move || {
                let headers = headers.clone();
                async move { client.post_json_stream(PROVIDER, url, headers, body).await }
            })
            .await?;

        let model = self.model.clone();
        Ok(decode(PROVIDER, byte_stream, move |line| {
            parse_ndjson_line(line, &model)
        }))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_ndjson_line(line: &str, model: &str) -> Result<Option<StreamChunk>, DomainError> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let response: OllamaChatResponse = serde_json::from_str(line).map_err(|e| {
        DomainError::unavailable(PROVIDER, format!("Malformed stream line: {e}"))
    })?;

    if let Some(error) = response.error {
        return Err(DomainError::unavailable(PROVIDER, error));
    }

    let mut chunk = StreamChunk::new(
        response.created_at.unwrap_or_default(),
        response.model.unwrap_or_else(|| model.to_string()),
    );

    if let Some(message) = response.message.filter(|m| !m.content.is_empty()) {
        chunk = chunk.with_delta(message.content);
    }

    if response.done {
        let reason = response
            .done_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or(FinishReason::Stop);
        chunk = chunk.with_finish_reason(reason);

        if let (Some(prompt), Some(completion)) = (response.prompt_eval_count, response.eval_count)
        {
            chunk = chunk.with_usage(Usage::new(prompt, completion));
        }
    }

    if chunk.delta.is_none() && !chunk.is_final() {
        return Ok(None);
    }

    Ok(Some(chunk))
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> OllamaMessage<'a> {
    fn from_domain(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content_text(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: Option<String>,
    created_at: Option<String>,
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}
