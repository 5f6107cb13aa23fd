//! Infrastructure layer - External service implementations

pub mod embedding;
pub mod evaluation;
pub mod index;
pub mod ingestion;
pub mod llm;
pub mod logging;
