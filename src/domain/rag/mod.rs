//! Retrieval-augmented question answering

mod answer;
mod orchestrator;
mod prompt;
mod request;

pub use answer::{QueryOutcome, RagAnswer, RagStream, RagStreamEvent};
pub use orchestrator::{RagConfig, RagOrchestrator};
pub use prompt::{build_request, format_context, instruction_template, no_context_marker};
pub use request::{ProviderSelection, QueryRequest};
