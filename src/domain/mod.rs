//! Domain layer - Core business logic and entities

pub mod conversation;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod index;
pub mod ingestion;
pub mod language;
pub mod llm;
pub mod rag;
pub mod retry;

pub use conversation::{ConversationMessage, ConversationRole, ConversationSession, SessionStore};
pub use embedding::{Embedder, EmbeddingProvider, EmbeddingVector};
pub use error::DomainError;
pub use evaluation::{
    EvaluationConfig, EvaluationHarness, EvaluationRecord, EvaluationReport, EvaluationSink,
    EvaluationSummary, LabeledQuestion,
};
pub use index::{RetrievalResult, ScoredChunk, SearchFilter, VectorIndex, VectorRecord};
pub use ingestion::{Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy, Document};
pub use language::Language;
pub use llm::{
    CompletionOptions, FinishReason, LlmProvider, LlmRequest, LlmRequestBuilder, LlmResponse,
    LlmStream, Message, MessageRole, ProviderRegistry, StreamChunk, Usage,
};
pub use rag::{
    ProviderSelection, QueryOutcome, QueryRequest, RagAnswer, RagConfig, RagOrchestrator,
    RagStream, RagStreamEvent,
};
pub use retry::{RetryOn, RetryPolicy};
