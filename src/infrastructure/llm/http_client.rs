use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::pin::Pin;
use std::time::Duration;

use crate::domain::DomainError;

/// Stream type for HTTP responses
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DomainError>> + Send>>;

/// Trait for HTTP client operations (for mocking)
///
/// `provider` names the backend in returned errors.
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        provider: &str,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;

    async fn post_json_stream(
        &self,
        provider: &str,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, DomainError>;
}

/// Map a non-success HTTP status to the domain taxonomy
pub fn status_error(
    provider: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> DomainError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return DomainError::rate_limited(provider, retry_after);
    }

    if status.is_server_error()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return DomainError::unavailable(provider, format!("HTTP {status}: {body}"));
    }

    DomainError::invalid_config(format!("{provider} rejected the request (HTTP {status}): {body}"))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    request_timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            request_timeout: None,
        }
    }

    /// Bound connection setup, and whole blocking requests, by `timeout`.
    /// Streaming responses are only bounded by the connect timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DomainError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_timeout: Some(timeout),
        })
    }

    async fn send(
        &self,
        provider: &str,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, DomainError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::unavailable(provider, format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(provider, status, retry_after, &error_body));
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        provider: &str,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let response = self
            .send(provider, url, headers, body, self.request_timeout)
            .await?;

        response.json().await.map_err(|e| {
            DomainError::unavailable(provider, format!("Failed to parse response: {e}"))
        })
    }

    async fn post_json_stream(
        &self,
        provider: &str,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, DomainError> {
        let response = self.send(provider, url, headers, body, None).await?;

        use futures::StreamExt;
        let provider = provider.to_string();
        let stream = response.bytes_stream().map(move |result| {
            result.map_err(|e| DomainError::unavailable(&provider, format!("Stream error: {e}")))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use futures::stream;
    use std::collections::{HashMap, VecDeque};
    use std::sync::RwLock;

    #[derive(Debug)]
    pub struct MockHttpClient {
        responses: RwLock<HashMap<String, serde_json::Value>>,
        stream_responses: RwLock<HashMap<String, Vec<Bytes>>>,
        errors: RwLock<HashMap<String, String>>,
        statuses: RwLock<HashMap<String, VecDeque<u16>>>,
        bodies: RwLock<Vec<(String, serde_json::Value)>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self {
                responses: RwLock::new(HashMap::new()),
                stream_responses: RwLock::new(HashMap::new()),
                errors: RwLock::new(HashMap::new()),
                statuses: RwLock::new(HashMap::new()),
                bodies: RwLock::new(Vec::new()),
            }
        }

        pub fn with_response(self, url: impl Into<String>, response: serde_json::Value) -> Self {
            self.responses.write().unwrap().insert(url.into(), response);
            self
        }

        pub fn with_stream_response(self, url: impl Into<String>, chunks: Vec<Bytes>) -> Self {
            self.stream_responses
                .write()
                .unwrap()
                .insert(url.into(), chunks);
            self
        }

        /// Every call to `url` fails as a transport error
        pub fn with_error(self, url: impl Into<String>, error: impl Into<String>) -> Self {
            self.errors.write().unwrap().insert(url.into(), error.into());
            self
        }

        /// The next calls to `url` fail with these HTTP statuses, in order
        pub fn with_statuses(self, url: impl Into<String>, statuses: Vec<u16>) -> Self {
            self.statuses
                .write()
                .unwrap()
                .entry(url.into())
                .or_default()
                .extend(statuses);
            self
        }

        /// Request bodies sent so far, with their urls
        pub fn bodies(&self) -> Vec<(String, serde_json::Value)> {
            self.bodies.read().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.bodies.read().unwrap().len()
        }

        fn check_failure(
            &self,
            provider: &str,
            url: &str,
            body: &serde_json::Value,
        ) -> Result<(), DomainError> {
            self.bodies
                .write()
                .unwrap()
                .push((url.to_string(), body.clone()));

            if let Some(error) = self.errors.read().unwrap().get(url) {
                return Err(DomainError::unavailable(provider, error));
            }

            let status = self
                .statuses
                .write()
                .unwrap()
                .get_mut(url)
                .and_then(VecDeque::pop_front);

            match status.and_then(|s| StatusCode::from_u16(s).ok()) {
                Some(status) => Err(status_error(provider, status, None, "mock")),
                None => Ok(()),
            }
        }
    }

    impl Default for MockHttpClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HttpClientTrait for MockHttpClient {
        async fn post_json(
            &self,
            provider: &str,
            url: &str,
            _headers: Vec<(&str, &str)>,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, DomainError> {
            self.check_failure(provider, url, body)?;

            self.responses
                .read()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| {
                    DomainError::unavailable(provider, format!("No mock response for {url}"))
                })
        }

        async fn post_json_stream(
            &self,
            provider: &str,
            url: &str,
            _headers: Vec<(&str, &str)>,
            body: &serde_json::Value,
        ) -> Result<ByteStream, DomainError> {
            self.check_failure(provider, url, body)?;

            let chunks = self
                .stream_responses
                .read()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_default();

            let stream = stream::iter(chunks.into_iter().map(Ok));
            Ok(Box::pin(stream))
        }
    }
}
