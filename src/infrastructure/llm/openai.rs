use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http_client::HttpClientTrait;
use super::stream::{decode, sse_data};
use crate::domain::retry::{RetryOn, RetryPolicy};
use crate::domain::{
    DomainError, FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message,
    StreamChunk, Usage,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const PROVIDER: &str = "openai";

/// OpenAI chat completions provider
#[derive(Debug)]
pub struct OpenAiProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl<C: HttpClientTrait> OpenAiProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let auth_header = format!("Bearer {}", api_key.into());
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            auth_header,
            base_url,
            model: DEFAULT_OPENAI_MODEL.to_string(),
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

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<OpenAiMessage> = request
            .messages
            .iter()
            .map(OpenAiMessage::from_domain)
            .collect();

        let options = &request.options;
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        if !options.stop_sequences.is_empty() {
            body["stop"] = serde_json::json!(options.stop_list());
        }

        body
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<LlmResponse, DomainError> {
        let response: OpenAiResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::unavailable(PROVIDER, format!("Failed to parse response: {e}"))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::unavailable(PROVIDER, "No choices in response"))?;

        let message = Message::assistant(choice.message.content.unwrap_or_default());

        let mut llm_response = LlmResponse::new(response.id, response.model, message);

        if let Some(reason) = choice.finish_reason {
            llm_response = llm_response.with_finish_reason(FinishReason::from_provider(&reason));
        }

        if let Some(usage) = response.usage {
            llm_response = llm_response.with_usage(Usage::new(
                usage.prompt_tokens,
                usage.completion_tokens,
            ));
        }

        Ok(llm_response)
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for OpenAiProvider<C> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        request.options.validate()?;

        let url = self.chat_completions_url();
        let body = self.build_request(&request, false);
        let (client, url, body, headers) = (&self.client, &url, &body, self.headers());

        let response = self
            .retry
            .run("openai.complete", move || {
                let headers = headers.clone();
                async move { client.post_json(PROVIDER, url, headers, body).await }
            })
            .await?;

        self.parse_response(response)
    }

    async fn stream_complete(&self, request: LlmRequest) -> Result<LlmStream, DomainError> {
        request.options.validate()?;

        let url = self.chat_completions_url();
        let body = self.build_request(&request, true);
        let (client, url, body, headers) = (&self.client, &url, &body, self.headers());

        let byte_stream = self
            .retry
            .run("openai.stream", move || {
                let headers = headers.clone();
                async move { client.post_json_stream(PROVIDER, url, headers, body).await }
            })
            .await?;

        let model = self.model.clone();
        Ok(decode(PROVIDER, byte_stream, move |line| {
            parse_sse_line(line, &model)
        }))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_sse_line(line: &str, model: &str) -> Result<Option<StreamChunk>, DomainError> {
    let Some(data) = sse_data(line) else {
        return Ok(None);
    };

    if data.trim() == "[DONE]" {
        return Ok(Some(
            StreamChunk::new(String::new(), model.to_string())
                .with_finish_reason(FinishReason::Stop),
        ));
    }

    let chunk: OpenAiStreamChunk = serde_json::from_str(data).map_err(|e| {
        DomainError::unavailable(PROVIDER, format!("Malformed stream event: {e}"))
    })?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let mut stream_chunk = StreamChunk::new(chunk.id, chunk.model.unwrap_or_else(|| model.to_string()));

    if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
        stream_chunk = stream_chunk.with_delta(delta);
    }

    if let Some(reason) = choice.finish_reason {
        stream_chunk = stream_chunk.with_finish_reason(FinishReason::from_provider(&reason));
    }

    if stream_chunk.delta.is_none() && !stream_chunk.is_final() {
        return Ok(None);
    }

    Ok(Some(stream_chunk))
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> OpenAiMessage<'a> {
    fn from_domain(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content_text(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    id: String,
    model: Option<String>,
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CompletionOptions;
    use crate::infrastructure::llm::http_client::mock::MockHttpClient;
    use bytes::Bytes;
    use futures::StreamExt;

    const TEST_URL: &str = "https://api.openai.com/v1/chat/completions";

    fn chat_response() -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "The refund period is 30 days [Document 1]."
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 8,
                "total_tokens": 18
            }
        })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2).with_initial_delay(1).with_max_delay(2)
    }

    #[tokio::test]
    async fn test_openai_complete() {
        let client = MockHttpClient::new().with_response(TEST_URL, chat_response());
        let provider = OpenAiProvider::new(client, "test-api-key");

        let request = LlmRequest::builder().user("What is the refund period?").build();
        let response = provider.complete(request).await.unwrap();

        assert_eq!(response.id, "chatcmpl-123");
        assert_eq!(response.content(), "The refund period is 30 days [Document 1].");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));

        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 8);
    }

    #[tokio::test]
    async fn test_request_body_carries_options() {
        let client = MockHttpClient::new().with_response(TEST_URL, chat_response());
        let provider = OpenAiProvider::new(client, "k").with_model("gpt-4o");

        let request = LlmRequest::builder()
            .system("rules")
            .user("q")
            .options(
                CompletionOptions::default()
                    .with_temperature(0.3)
                    .with_max_tokens(64)
                    .with_stop_sequence("END"),
            )
            .build();
        provider.complete(request).await.unwrap();

        let (_, body) = provider.client.bodies().remove(0);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stop"], serde_json::json!(["END"]));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = MockHttpClient::new()
            .with_statuses(TEST_URL, vec![503, 429])
            .with_response(TEST_URL, chat_response());
        let provider = OpenAiProvider::new(client, "k").with_retry(fast_retry());

        let request = LlmRequest::builder().user("q").build();
        assert!(provider.complete(request).await.is_ok());
        assert_eq!(provider.client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let client = MockHttpClient::new()
            .with_statuses(TEST_URL, vec![400])
            .with_response(TEST_URL, chat_response());
        let provider = OpenAiProvider::new(client, "k").with_retry(fast_retry());

        let result = provider.complete(LlmRequest::builder().user("q").build()).await;
        assert!(matches!(result, Err(DomainError::InvalidConfig { .. })));
        assert_eq!(provider.client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_openai_error_handling() {
        let client = MockHttpClient::new().with_error(TEST_URL, "connection reset");
        let provider = OpenAiProvider::new(client, "invalid-key").with_retry(RetryPolicy::none());

        let result = provider.complete(LlmRequest::builder().user("Hello!").build()).await;
        assert!(matches!(result, Err(DomainError::ProviderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_stream_decodes_all_events() {
        let events = concat!(
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"delta\":{\"content\":\"The refund \"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"delta\":{\"content\":\"period is \"},\"finish_reason\":null}]}\n\n",
        );
        let client = MockHttpClient::new().with_stream_response(
            TEST_URL,
            vec![
                Bytes::from(events),
                Bytes::from("data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"30 da"),
                Bytes::from("ys.\"},\"finish_reason\":null}]}\n\n"),
                Bytes::from("data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n"),
            ],
        );
        let provider = OpenAiProvider::new(client, "k");

        let stream = provider
            .stream_complete(LlmRequest::builder().user("q").build())
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;

        let text: String = chunks.iter().filter_map(|c| c.delta.clone()).collect();
        assert_eq!(text, "The refund period is 30 days.");
        assert_eq!(chunks.last().unwrap().finish_reason, Some(FinishReason::Stop));
        assert_eq!(provider.client.bodies()[0].1["stream"], true);
    }

    #[tokio::test]
    async fn test_custom_base_url() {
        let custom_url = "http://localhost:8080/v1/chat/completions";
        let client = MockHttpClient::new().with_response(custom_url, chat_response());
        let provider = OpenAiProvider::with_base_url(client, "test-key", "http://localhost:8080/");

        let response = provider
            .complete(LlmRequest::builder().user("Test").build())
            .await
            .unwrap();

        assert_eq!(response.id, "chatcmpl-123");
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model(), DEFAULT_OPENAI_MODEL);
    }
}
