//! Document ingestion domain types and traits
//!
//! This module provides:
//! - `Document`, the unit handed to ingestion
//! - `ChunkingStrategy` trait for splitting documents into chunks
//! - Content-addressed chunk identities

pub mod chunker;
pub mod document;

// Re-export main types
pub use chunker::{
    Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy, chunk_id, reassemble,
};
pub use document::{Document, document_id, source_name};
