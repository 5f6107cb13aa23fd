//! Document ingestion infrastructure
//!
//! This module provides the chunker implementation, corpus loading from
//! disk, and the ingestion pipeline.

pub mod chunkers;
pub mod loader;
pub mod pipeline;

pub use chunkers::RecursiveChunker;
pub use loader::{SUPPORTED_EXTENSIONS, is_supported, load_directory, load_file};
pub use pipeline::{IngestionPipeline, IngestionReport};
