//! Query orchestration: retrieve, prompt, generate, remember

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::answer::{QueryOutcome, RagAnswer, RagStream, RagStreamEvent};
use super::prompt::build_request;
use super::request::{ProviderSelection, QueryRequest};
use crate::domain::DomainError;
use crate::domain::conversation::{ConversationMessage, ConversationSession, SessionStore};
use crate::domain::embedding::Embedder;
use crate::domain::index::{RetrievalResult, SearchFilter, VectorIndex};
use crate::domain::language::{Language, detect_language};
use crate::domain::llm::{
    CompletionOptions, LlmProvider, LlmRequest, ProviderRegistry, StreamChunk,
};

type EventSender = mpsc::Sender<Result<RagStreamEvent, DomainError>>;

/// Retrieval and generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunks retrieved per question
    #[serde(default = "default_k")]
    pub k: usize,
    /// Prior turns (user + assistant) included in the prompt
    #[serde(default = "default_memory_turns")]
    pub memory_turns: usize,
    /// Upper bound on the whole generation phase, fallback included
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    /// Capacity of the fragment channel of a streamed answer
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    #[serde(default)]
    pub options: CompletionOptions,
}

fn default_k() -> usize {
    4
}

fn default_memory_turns() -> usize {
    5
}

fn default_generation_timeout_ms() -> u64 {
    120_000
}

fn default_stream_buffer() -> usize {
    32
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            memory_turns: default_memory_turns(),
            generation_timeout_ms: default_generation_timeout_ms(),
            stream_buffer: default_stream_buffer(),
            options: CompletionOptions::default(),
        }
    }
}

impl RagConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_memory_turns(mut self, turns: usize) -> Self {
        self.memory_turns = turns;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.k == 0 {
            return Err(DomainError::invalid_config("k must be greater than 0"));
        }
        if self.stream_buffer == 0 {
            return Err(DomainError::invalid_config(
                "stream_buffer must be greater than 0",
            ));
        }
        if self.generation_timeout_ms == 0 {
            return Err(DomainError::invalid_config(
                "generation_timeout_ms must be greater than 0",
            ));
        }
        self.options.validate()
    }
}

/// Per-query lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    Retrieving,
    Prompting,
    Generating,
    Complete,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Retrieving => "retrieving",
            QueryState::Prompting => "prompting",
            QueryState::Generating => "generating",
            QueryState::Complete => "complete",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Logs each state transition with the time spent so far
#[derive(Debug)]
struct QueryTrace {
    state: QueryState,
    started: Instant,
}

impl QueryTrace {
    fn start() -> Self {
        debug!(state = %QueryState::Retrieving, "Query started");
        Self {
            state: QueryState::Retrieving,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: QueryState) {
        debug!(
            from = %self.state,
            to = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Query state changed"
        );
        self.state = next;
    }

    fn fail(&mut self, error: &DomainError) {
        warn!(
            state = %self.state,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = %error,
            "Query failed"
        );
        self.state = QueryState::Failed;
    }
}

/// A provider the query may be served by, under its registry name
#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    provider: Arc<dyn LlmProvider>,
}

/// What the generation phase produced
#[derive(Debug)]
struct Generated {
    served_by: String,
    model: String,
    text: String,
}

/// Everything needed to finish a query once the answer text exists
#[derive(Debug)]
struct PendingTurn {
    selection: ProviderSelection,
    question: String,
    retrieval: RetrievalResult,
    language: Language,
}

impl PendingTurn {
    /// Append the turn to the session and build the answer
    fn complete(
        self,
        session: &mut ConversationSession,
        generated: Generated,
    ) -> Result<RagAnswer, DomainError> {
        let citations = self.retrieval.chunk_ids();

        session.append_turn(
            &self.selection,
            ConversationMessage::user(self.question),
            ConversationMessage::assistant(generated.text.clone(), citations.clone()),
        )?;

        Ok(RagAnswer {
            answer: generated.text,
            citations,
            retrieval: self.retrieval,
            served_by: generated.served_by,
            model: generated.model,
            language: self.language,
        })
    }
}

/// Answers questions over the indexed corpus.
///
/// Owns the conversation sessions. A query holds its session's lock from
/// retrieval until the answer is recorded, so queries on one session run one
/// at a time while different sessions proceed independently.
#[derive(Debug)]
pub struct RagOrchestrator {
    index: Arc<dyn VectorIndex>,
    embedder: Embedder,
    providers: ProviderRegistry,
    sessions: SessionStore,
    config: RagConfig,
}

impl RagOrchestrator {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Embedder,
        providers: ProviderRegistry,
        config: RagConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        embedder.ensure_compatible(index.as_ref())?;

        if providers.is_empty() {
            return Err(DomainError::invalid_config(
                "at least one completion provider must be configured",
            ));
        }

        Ok(Self {
            index,
            embedder,
            providers,
            sessions: SessionStore::new(),
            config,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn count(&self) -> Result<usize, DomainError> {
        self.index.count().await
    }

    /// Empty the index; sessions are left alone
    pub async fn delete_all(&self) -> Result<usize, DomainError> {
        let removed = self.index.delete_all().await?;
        info!(removed, "Index cleared");
        Ok(removed)
    }

    /// Top-k chunks for a question
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult, DomainError> {
        let query = self.embedder.embed_query(question).await?;
        self.index
            .search(&query, self.config.k, &SearchFilter::new())
            .await
    }

    /// Answer one question within its session
    #[instrument(
        skip(self, request),
        fields(session_id = %request.session_id, selection = %request.selection, stream = request.stream)
    )]
    pub async fn query(&self, request: QueryRequest) -> Result<QueryOutcome, DomainError> {
        let QueryRequest {
            session_id,
            question,
            selection,
            stream,
        } = request;

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(DomainError::invalid_config("question must not be empty"));
        }

        let candidates = self.candidates(&selection)?;
        let session = self.sessions.handle(&session_id).await.lock_owned().await;
        session.check_selection(&selection)?;

        let mut trace = QueryTrace::start();

        let retrieval = match self.retrieve(&question).await {
            Ok(retrieval) => retrieval,
            Err(error) => {
                trace.fail(&error);
                return Err(error);
            }
        };
        debug!(
            chunks = retrieval.len(),
            documents = ?retrieval.document_ids(),
            "Retrieved context"
        );
        trace.advance(QueryState::Prompting);

        let language = selection
            .language
            .unwrap_or_else(|| detect_language(&question));
        let llm_request = build_request(
            &question,
            &retrieval,
            session.recent_turns(self.config.memory_turns),
            language,
            &self.config.options,
        );
        trace.advance(QueryState::Generating);

        let pending = PendingTurn {
            selection,
            question,
            retrieval,
            language,
        };

        if stream {
            let (tx, rx) = mpsc::channel(self.config.stream_buffer);
            let job = StreamJob {
                candidates,
                request: llm_request,
                session,
                pending,
                timeout: self.config.generation_timeout(),
                trace,
            };

            tokio::spawn(job.run(tx).instrument(Span::current()));
            return Ok(QueryOutcome::Stream(RagStream::new(rx)));
        }

        let mut session = session;
        let generated = match self.generate(&candidates, llm_request).await {
            Ok(generated) => generated,
            Err(error) => {
                trace.fail(&error);
                return Err(error);
            }
        };

        let answer = pending.complete(&mut session, generated)?;
        trace.advance(QueryState::Complete);
        info!(served_by = %answer.served_by, citations = answer.citations.len(), "Query answered");

        Ok(QueryOutcome::Complete(answer))
    }

    fn candidates(&self, selection: &ProviderSelection) -> Result<Vec<Candidate>, DomainError> {
        let mut candidates = vec![Candidate {
            name: selection.completion.clone(),
            provider: self.providers.get(&selection.completion)?,
        }];

        if let Some(fallback) = &selection.fallback {
            if fallback != &selection.completion {
                candidates.push(Candidate {
                    name: fallback.clone(),
                    provider: self.providers.get(fallback)?,
                });
            }
        }

        Ok(candidates)
    }

    /// Blocking generation with at most one fallback
    async fn generate(
        &self,
        candidates: &[Candidate],
        request: LlmRequest,
    ) -> Result<Generated, DomainError> {
        let primary = candidates
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let timeout = self.config.generation_timeout();

        let attempt = async {
            for (i, candidate) in candidates.iter().enumerate() {
                let has_fallback = i + 1 < candidates.len();

                match candidate.provider.complete(request.clone()).await {
                    Ok(response) => {
                        return Ok(Generated {
                            served_by: candidate.name.clone(),
                            model: candidate.provider.model().to_string(),
                            text: response.content().to_string(),
                        });
                    }
                    Err(error) if error.is_transient() && has_fallback => {
                        warn!(provider = %candidate.name, error = %error, "Provider failed, trying fallback");
                    }
                    Err(error) => return Err(error.into_generation_failure(&candidate.name)),
                }
            }

            Err(DomainError::internal("no completion provider to try"))
        };

        tokio::time::timeout(timeout, attempt)
            .await
            .unwrap_or_else(|_| Err(timed_out(&primary, timeout)))
    }
}

fn timed_out(provider: &str, timeout: Duration) -> DomainError {
    DomainError::generation_failed(
        provider,
        format!("generation timed out after {}ms", timeout.as_millis()),
    )
}

/// Why forwarding a stream stopped early
#[derive(Debug)]
enum Interrupted {
    /// The consumer dropped the stream
    Cancelled,
    Failed(DomainError),
}

/// Producer side of a streamed answer
struct StreamJob {
    candidates: Vec<Candidate>,
    request: LlmRequest,
    session: OwnedMutexGuard<ConversationSession>,
    pending: PendingTurn,
    timeout: Duration,
    trace: QueryTrace,
}

impl StreamJob {
    async fn run(self, tx: EventSender) {
        let StreamJob {
            candidates,
            request,
            mut session,
            pending,
            timeout,
            mut trace,
        } = self;

        let primary = candidates
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_default();

        let outcome = tokio::select! {
            _ = tx.closed() => Err(Interrupted::Cancelled),
            result = tokio::time::timeout(timeout, forward(&candidates, request, &tx)) => {
                result.unwrap_or_else(|_| Err(Interrupted::Failed(timed_out(&primary, timeout))))
            }
        };

        match outcome {
            Ok(generated) => {
                let Ok(permit) = tx.reserve().await else {
                    info!("Answer stream dropped before completion");
                    return;
                };

                match pending.complete(&mut session, generated) {
                    Ok(answer) => {
                        trace.advance(QueryState::Complete);
                        info!(served_by = %answer.served_by, citations = answer.citations.len(), "Query answered");
                        permit.send(Ok(RagStreamEvent::Complete(answer)));
                    }
                    Err(error) => {
                        trace.fail(&error);
                        permit.send(Err(error));
                    }
                }
            }
            Err(Interrupted::Cancelled) => {
                info!("Answer stream dropped by consumer, generation cancelled");
            }
            Err(Interrupted::Failed(error)) => {
                trace.fail(&error);
                // The consumer may already be gone
                let _ = tx.send(Err(error)).await;
            }
        }
    }
}

/// Forward fragments from the first provider that streams successfully.
///
/// Falls back only while nothing has been forwarded, so the consumer never
/// sees text from two providers.
async fn forward(
    candidates: &[Candidate],
    request: LlmRequest,
    tx: &EventSender,
) -> Result<Generated, Interrupted> {
    for (i, candidate) in candidates.iter().enumerate() {
        let has_fallback = i + 1 < candidates.len();

        let mut stream = match candidate.provider.stream_complete(request.clone()).await {
            Ok(stream) => stream,
            Err(error) if error.is_transient() && has_fallback => {
                warn!(provider = %candidate.name, error = %error, "Provider failed, trying fallback");
                continue;
            }
            Err(error) => {
                return Err(Interrupted::Failed(
                    error.into_generation_failure(&candidate.name),
                ));
            }
        };

        let mut text = String::new();
        let mut forwarded = false;

        let error = loop {
            match stream.next().await {
                Some(Ok(StreamChunk {
                    delta,
                    finish_reason,
                    ..
                })) => {
                    if let Some(delta) = delta.filter(|d| !d.is_empty()) {
                        text.push_str(&delta);
                        tx.send(Ok(RagStreamEvent::Fragment(delta)))
                            .await
                            .map_err(|_| Interrupted::Cancelled)?;
                        forwarded = true;
                    }

                    if finish_reason.is_some() {
                        return Ok(Generated {
                            served_by: candidate.name.clone(),
                            model: candidate.provider.model().to_string(),
                            text,
                        });
                    }
                }
                Some(Err(error)) => break error,
                None => {
                    break DomainError::unavailable(
                        &candidate.name,
                        "stream ended without a finish reason",
                    );
                }
            }
        };

        if !forwarded && error.is_transient() && has_fallback {
            warn!(provider = %candidate.name, error = %error, "Stream failed before first fragment, trying fallback");
            continue;
        }

        return Err(Interrupted::Failed(
            error.into_generation_failure(&candidate.name),
        ));
    }

    Err(Interrupted::Failed(DomainError::internal(
        "no completion provider to try",
    )))
}
