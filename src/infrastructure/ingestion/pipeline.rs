//! Ingestion pipeline service

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::domain::DomainError;
use crate::domain::embedding::Embedder;
use crate::domain::index::{VectorIndex, VectorRecord};
use crate::domain::ingestion::{Chunk, ChunkingConfig, ChunkingStrategy, Document};

use super::chunkers::RecursiveChunker;

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub document_id: String,
    pub source_identifier: String,
    /// Chunks the document is stored as
    pub chunks: usize,
    /// Chunks that were not stored yet and had to be embedded
    pub embedded: usize,
    /// Stale chunks of an earlier version that were removed
    pub pruned: usize,
}

/// Document -> chunks -> vectors -> index
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    chunker: Arc<dyn ChunkingStrategy>,
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
}

impl IngestionPipeline {
    /// Create a pipeline using the recursive chunker.
    ///
    /// Fails with `DimensionMismatch` when the embedder does not produce the
    /// vectors the index is configured for.
    pub fn new(embedder: Embedder, index: Arc<dyn VectorIndex>) -> Result<Self, DomainError> {
        embedder.ensure_compatible(index.as_ref())?;

        Ok(Self {
            chunker: Arc::new(RecursiveChunker::new()),
            embedder,
            index,
        })
    }

    pub fn with_chunker(mut self, chunker: Arc<dyn ChunkingStrategy>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Chunk, embed and upsert one document, then drop chunks left over
    /// from a previous version of it.
    ///
    /// Whitespace-only chunks are not indexed, and chunks already stored
    /// under the same content-addressed id are not embedded again.
    #[instrument(skip(self, document, config), fields(source = %document.source_identifier))]
    pub async fn ingest(
        &self,
        document: Document,
        config: &ChunkingConfig,
    ) -> Result<IngestionReport, DomainError> {
        let document = document.with_detected_language();
        let chunks: Vec<Chunk> = self
            .chunker
            .chunk(&document, config)?
            .into_iter()
            .filter(|chunk| !chunk.text.trim().is_empty())
            .collect();
        debug!(chunks = chunks.len(), strategy = self.chunker.name(), "Document chunked");

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let stored = self.index.existing_ids(&ids).await?;
        let keep_ids: HashSet<String> = ids.into_iter().collect();
        let total = keep_ids.len();

        let fresh: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| !stored.contains(&chunk.id))
            .collect();

        let embedded = if fresh.is_empty() {
            0
        } else {
            let vectors = self.embedder.embed_chunks(&fresh).await?;
            let records = fresh
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord::new(chunk, vector))
                .collect();
            self.index.upsert(records).await?
        };

        let pruned = self.index.prune_document(&document.id, &keep_ids).await?;

        info!(
            document_id = %document.id,
            chunks = total,
            embedded,
            pruned,
            "Document ingested"
        );

        Ok(IngestionReport {
            document_id: document.id,
            source_identifier: document.source_identifier,
            chunks: total,
            embedded,
            pruned,
        })
    }

    /// Ingest documents in order, stopping at the first failure
    pub async fn ingest_all(
        &self,
        documents: Vec<Document>,
        config: &ChunkingConfig,
    ) -> Result<Vec<IngestionReport>, DomainError> {
        config.validate()?;

        let mut reports = Vec::with_capacity(documents.len());
        for document in documents {
            reports.push(self.ingest(document, config).await?);
        }

        Ok(reports)
    }
}
