//! Chunking strategy trait and types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;

use super::Document;
use crate::domain::DomainError;

/// Configuration for chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters, overlap included
    pub max_chars: usize,
    /// Characters repeated from the end of the previous chunk
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_chars == 0 {
            return Err(DomainError::invalid_config(
                "max_chars must be greater than 0",
            ));
        }

        if self.overlap_chars >= self.max_chars {
            return Err(DomainError::invalid_config(format!(
                "overlap_chars ({}) must be less than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }

        Ok(())
    }

    /// Characters available for new text in each chunk
    pub fn core_budget(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

/// Metadata for a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Display name of the source, used in citations
    pub source_name: String,
    /// Nearest markdown heading at or before the chunk
    pub section: Option<String>,
    /// 1-based page number when the text carries form-feed page breaks
    pub page: Option<u32>,
    /// Character offset where the non-overlapping part starts
    pub char_start: usize,
    /// Character offset where the non-overlapping part ends
    pub char_end: usize,
    /// Leading characters copied from the previous chunk
    pub overlap_chars: usize,
}

/// A chunk of text extracted from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub position: usize,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// The part of the text that does not repeat the previous chunk
    pub fn core_text(&self) -> &str {
        match self.text.char_indices().nth(self.metadata.overlap_chars) {
            Some((offset, _)) => &self.text[offset..],
            None => "",
        }
    }

    /// Get the content length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Content-addressed chunk id.
///
/// Hashes the source identifier, the position and a digest of the text, so
/// identical content at the same place always maps to the same id.
pub fn chunk_id(source_identifier: &str, position: usize, text: &str) -> String {
    let text_digest = Sha256::digest(text.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(source_identifier.as_bytes());
    hasher.update([0u8]);
    hasher.update(position.to_le_bytes());
    hasher.update(text_digest);

    hex::encode(hasher.finalize())
}

/// Rebuild the document text from its chunks by dropping each overlap prefix
pub fn reassemble(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::core_text).collect()
}

/// Trait for chunking strategies
pub trait ChunkingStrategy: Send + Sync + Debug {
    /// Split a document into ordered chunks
    fn chunk(&self, document: &Document, config: &ChunkingConfig)
    -> Result<Vec<Chunk>, DomainError>;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with(text: &str, overlap_chars: usize) -> Chunk {
        Chunk {
            id: "c".to_string(),
            document_id: "d".to_string(),
            text: text.to_string(),
            position: 0,
            metadata: ChunkMetadata {
                source_name: "doc.md".to_string(),
                section: None,
                page: None,
                char_start: 0,
                char_end: 0,
                overlap_chars,
            },
        }
    }

    #[test]
    fn test_chunking_config_default() {
        let config = ChunkingConfig::default();
        assert_eq!(config.max_chars, 1000);
        assert_eq!(config.overlap_chars, 200);
        assert_eq!(config.core_budget(), 800);
    }

    #[test]
    fn test_chunking_config_validation() {
        assert!(ChunkingConfig::new(100, 50).validate().is_ok());
        assert!(ChunkingConfig::new(100, 0).validate().is_ok());

        let zero = ChunkingConfig::new(0, 0).validate();
        assert!(matches!(zero, Err(DomainError::InvalidConfig { .. })));

        let equal = ChunkingConfig::new(100, 100).validate();
        assert!(matches!(equal, Err(DomainError::InvalidConfig { .. })));
    }

    #[test]
    fn test_chunk_id_is_content_addressed() {
        let a = chunk_id("docs/a.md", 0, "refund period: 30 days");
        assert_eq!(a, chunk_id("docs/a.md", 0, "refund period: 30 days"));
        assert_ne!(a, chunk_id("docs/a.md", 1, "refund period: 30 days"));
        assert_ne!(a, chunk_id("docs/b.md", 0, "refund period: 30 days"));
        assert_ne!(a, chunk_id("docs/a.md", 0, "refund period: 60 days"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_core_text_skips_overlap_by_chars() {
        let chunk = chunk_with("äöü rest", 3);
        assert_eq!(chunk.core_text(), " rest");
        assert_eq!(chunk.char_len(), 8);
    }

    #[test]
    fn test_reassemble() {
        let chunks = vec![chunk_with("hello wor", 0), chunk_with("world", 3)];
        assert_eq!(reassemble(&chunks), "hello world");
    }
}
