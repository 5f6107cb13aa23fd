//! docqa
//!
//! Retrieval-augmented question answering over a private document corpus:
//! - Boundary-preferring chunking with content-addressed chunk ids
//! - Pluggable embedding backends (OpenAI, Ollama, offline hashing)
//! - In-memory vector index with cosine search
//! - Completion providers (OpenAI, Anthropic, Ollama), blocking or streamed
//! - Session-aware orchestration with provider fallback
//! - Evaluation of answer faithfulness and retrieval relevance

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
