//! Records stored in and returned from a vector index

use serde::{Deserialize, Serialize};

use crate::domain::embedding::EmbeddingVector;
use crate::domain::ingestion::Chunk;

/// A chunk paired with its vector, unique by chunk id inside an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub vector: EmbeddingVector,
}

impl VectorRecord {
    pub fn new(chunk: Chunk, vector: EmbeddingVector) -> Self {
        Self { chunk, vector }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}

/// A retrieved chunk with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked search hits for one query, most similar first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub items: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(items: Vec<ScoredChunk>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.items.iter()
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.items.iter().map(|s| s.chunk.id.clone()).collect()
    }

    /// Distinct document ids in rank order
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for item in &self.items {
            if !ids.contains(&item.chunk.document_id) {
                ids.push(item.chunk.document_id.clone());
            }
        }
        ids
    }
}

/// Optional restrictions applied during search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Only return chunks of these documents (empty means any)
    #[serde(default)]
    pub document_ids: Vec<String>,
    /// Only return chunks whose source name matches
    #[serde(default)]
    pub source_name: Option<String>,
    /// Drop hits scoring below this similarity
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document_ids(mut self, ids: Vec<String>) -> Self {
        self.document_ids = ids;
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn matches_chunk(&self, chunk: &Chunk) -> bool {
        if !self.document_ids.is_empty() && !self.document_ids.contains(&chunk.document_id) {
            return false;
        }

        match &self.source_name {
            Some(name) => chunk.metadata.source_name == *name,
            None => true,
        }
    }

    pub fn matches_score(&self, score: f32) -> bool {
        self.min_score.is_none_or(|min| score >= min)
    }
}
