use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::DomainError;
use crate::domain::index::RetrievalResult;
use crate::domain::language::Language;

/// A grounded answer with the retrieval it was produced from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    /// Ids of the chunks placed in the prompt, in rank order
    pub citations: Vec<String>,
    pub retrieval: RetrievalResult,
    /// Registry name of the provider that produced the answer
    pub served_by: String,
    pub model: String,
    pub language: Language,
}

impl RagAnswer {
    /// Whether a provider other than the selected one answered
    pub fn used_fallback(&self, selected: &str) -> bool {
        self.served_by != selected
    }
}

/// Item of a streamed answer
#[derive(Debug, Clone, PartialEq)]
pub enum RagStreamEvent {
    Fragment(String),
    /// Always the last event of a successful stream
    Complete(RagAnswer),
}

/// Result of a query: the full answer, or a stream of fragments ending in it
#[derive(Debug)]
pub enum QueryOutcome {
    Complete(RagAnswer),
    Stream(RagStream),
}

/// Receiving end of a streamed answer.
///
/// Dropping it cancels generation: the producer observes the closed channel
/// and drops the provider stream.
#[derive(Debug)]
pub struct RagStream {
    inner: ReceiverStream<Result<RagStreamEvent, DomainError>>,
}

impl RagStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Result<RagStreamEvent, DomainError>>) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
        }
    }

    /// Drain the stream, passing each fragment to `on_fragment`, and return
    /// the final answer
    pub async fn for_each_fragment<F>(mut self, mut on_fragment: F) -> Result<RagAnswer, DomainError>
    where
        F: FnMut(&str),
    {
        while let Some(event) = self.next().await {
            match event? {
                RagStreamEvent::Fragment(text) => on_fragment(&text),
                RagStreamEvent::Complete(answer) => return Ok(answer),
            }
        }

        Err(DomainError::internal("answer stream ended without a result"))
    }

    pub async fn into_answer(self) -> Result<RagAnswer, DomainError> {
        self.for_each_fragment(|_| {}).await
    }
}

impl Stream for RagStream {
    type Item = Result<RagStreamEvent, DomainError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl QueryOutcome {
    /// The final answer, draining the stream if there is one
    pub async fn into_answer(self) -> Result<RagAnswer, DomainError> {
        match self {
            QueryOutcome::Complete(answer) => Ok(answer),
            QueryOutcome::Stream(stream) => stream.into_answer().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer() -> RagAnswer {
        RagAnswer {
            answer: "30 days".to_string(),
            citations: vec!["c1".to_string()],
            retrieval: RetrievalResult::default(),
            served_by: "local".to_string(),
            model: "llama3.2".to_string(),
            language: Language::English,
        }
    }

    #[tokio::test]
    async fn test_stream_collects_fragments_then_answer() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(RagStreamEvent::Fragment("30 ".to_string()))).await.unwrap();
        tx.send(Ok(RagStreamEvent::Fragment("days".to_string()))).await.unwrap();
        tx.send(Ok(RagStreamEvent::Complete(answer()))).await.unwrap();
        drop(tx);

        let mut text = String::new();
        let result = RagStream::new(rx)
            .for_each_fragment(|f| text.push_str(f))
            .await
            .unwrap();

        assert_eq!(text, "30 days");
        assert_eq!(result, answer());
        assert!(result.used_fallback("openai"));
    }

    #[tokio::test]
    async fn test_stream_error_and_truncation() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(Err(DomainError::generation_failed("mock", "boom"))).await.unwrap();
        drop(tx);
        assert!(matches!(
            RagStream::new(rx).into_answer().await,
            Err(DomainError::GenerationFailed { .. })
        ));

        let (tx, rx) = mpsc::channel::<Result<RagStreamEvent, DomainError>>(1);
        drop(tx);
        assert!(RagStream::new(rx).into_answer().await.is_err());
    }
}
