use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http_client::HttpClientTrait;
use super::stream::{decode, sse_data};
use crate::domain::retry::{RetryOn, RetryPolicy};
use crate::domain::{
    DomainError, FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message,
    StreamChunk, Usage,
};

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const PROVIDER: &str = "anthropic";

/// Anthropic API provider
#[derive(Debug)]
pub struct AnthropicProvider<C: HttpClientTrait> {
    client: C,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl<C: HttpClientTrait> AnthropicProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_ANTHROPIC_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            api_key: api_key.into(),
            base_url,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
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

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_request(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<AnthropicMessage> = request
            .conversation()
            .map(AnthropicMessage::from_domain)
            .collect();

        let options = &request.options;
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": stream,
        });

        // The system prompt travels outside the message list
        if let Some(system) = request.system_text() {
            body["system"] = serde_json::json!(system);
        }

        if !options.stop_sequences.is_empty() {
            body["stop_sequences"] = serde_json::json!(options.stop_list());
        }

        body
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", ANTHROPIC_VERSION),
            ("Content-Type", "application/json"),
        ]
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<LlmResponse, DomainError> {
        let response: AnthropicResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::unavailable(PROVIDER, format!("Failed to parse response: {e}"))
        })?;

        let content = response
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text)
            .collect::<String>();

        let finish_reason = response
            .stop_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or(FinishReason::Stop);

        Ok(
            LlmResponse::new(response.id, response.model, Message::assistant(content))
                .with_finish_reason(finish_reason)
                .with_usage(Usage::new(
                    response.usage.input_tokens,
                    response.usage.output_tokens,
                )),
        )
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for AnthropicProvider<C> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        request.options.validate()?;

        let url = self.messages_url();
        let body = self.build_request(&request, false);
        let (client, url, body, headers) = (&self.client, &url, &body, self.headers());

        let response = self
            .retry
            .run("anthropic.complete", move || {
                let headers = headers.clone();
                async move { client.post_json(PROVIDER, url, headers, body).await }
            })
            .await?;

        self.parse_response(response)
    }

    async fn stream_complete(&self, request: LlmRequest) -> Result<LlmStream, DomainError> {
        request.options.validate()?;

        let url = self.messages_url();
        let body = self.build_request(&request, true);
        let (client, url, body, headers) = (&self.client, &url, &body, self.headers());

        let byte_stream = self
            .retry
            .run("anthropic.stream", move || {
                let headers = headers.clone();
                async move { client.post_json_stream(PROVIDER, url, headers, body).await }
            })
            .await?;

        let mut state = EventState::new(self.model.clone());
        Ok(decode(PROVIDER, byte_stream, move |line| state.parse(line)))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Anthropic reports the stop reason in `message_delta` and ends with a
/// separate `message_stop`, so the reason is carried between events.
struct EventState {
    message_id: String,
    model: String,
    stop_reason: Option<FinishReason>,
}

impl EventState {
    fn new(model: String) -> Self {
        Self {
            message_id: String::new(),
            model,
            stop_reason: None,
        }
    }

    fn chunk(&self) -> StreamChunk {
        StreamChunk::new(self.message_id.clone(), self.model.clone())
    }

    fn parse(&mut self, line: &str) -> Result<Option<StreamChunk>, DomainError> {
        let Some(data) = sse_data(line) else {
            return Ok(None);
        };

        let event: AnthropicStreamEvent = serde_json::from_str(data).map_err(|e| {
            DomainError::unavailable(PROVIDER, format!("Malformed stream event: {e}"))
        })?;

        match event.event_type.as_str() {
            "message_start" => {
                if let Some(message) = event.message {
                    self.message_id = message.id;
                    if let Some(model) = message.model {
                        self.model = model;
                    }
                }
                Ok(None)
            }
            "content_block_delta" => Ok(event
                .delta
                .filter(|d| d.delta_type == "text_delta")
                .and_then(|d| d.text)
                .filter(|text| !text.is_empty())
                .map(|text| self.chunk().with_delta(text))),
            "message_delta" => {
                if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                    self.stop_reason = Some(FinishReason::from_provider(&reason));
                }
                Ok(None)
            }
            "message_stop" => {
                let reason = self.stop_reason.clone().unwrap_or(FinishReason::Stop);
                Ok(Some(self.chunk().with_finish_reason(reason)))
            }
            "error" => {
                let message = event
                    .error
                    .map(|e| format!("{}: {}", e.error_type, e.message))
                    .unwrap_or_else(|| "stream error".to_string());
                Err(DomainError::unavailable(PROVIDER, message))
            }
            _ => Ok(None),
        }
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> AnthropicMessage<'a> {
    fn from_domain(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content_text(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    message: Option<StreamMessage>,
    delta: Option<StreamDelta>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    id: String,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: String,
    text: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
