//! In-memory vector index

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::DomainError;
use crate::domain::embedding::{EmbeddingVector, cosine_similarity};
use crate::domain::index::{RetrievalResult, ScoredChunk, SearchFilter, VectorIndex, VectorRecord};

/// Brute-force cosine index held in memory.
///
/// Writers take the lock once per batch, so a concurrent search sees either
/// none or all of an upsert.
#[derive(Debug, Clone)]
pub struct InMemoryVectorIndex {
    dimension: usize,
    provider_tag: String,
    state: Arc<RwLock<IndexState>>,
}

#[derive(Debug, Default)]
struct IndexState {
    records: HashMap<String, StoredRecord>,
    next_sequence: u64,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    sequence: u64,
    record: VectorRecord,
}

/// JSON form of an index written by [`InMemoryVectorIndex::save_snapshot`]
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    provider_tag: String,
    /// In insertion order
    records: Vec<VectorRecord>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize, provider_tag: impl Into<String>) -> Self {
        Self {
            dimension,
            provider_tag: provider_tag.into(),
            state: Arc::new(RwLock::new(IndexState::default())),
        }
    }

    /// Write every record to `path` as JSON; returns how many were saved.
    ///
    /// The file is written next to `path` and renamed into place, so a crash
    /// never leaves a truncated snapshot behind.
    pub async fn save_snapshot(&self, path: &Path) -> Result<usize, DomainError> {
        let snapshot = {
            let state = self.state.read().await;
            let mut stored: Vec<&StoredRecord> = state.records.values().collect();
            stored.sort_by_key(|s| s.sequence);

            IndexSnapshot {
                dimension: self.dimension,
                provider_tag: self.provider_tag.clone(),
                records: stored.into_iter().map(|s| s.record.clone()).collect(),
            }
        };

        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| DomainError::internal(format!("failed to encode index snapshot: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::io(format!("failed to create {}: {e}", parent.display())))?;
        }

        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, json)
            .await
            .map_err(|e| DomainError::io(format!("failed to write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| DomainError::io(format!("failed to write {}: {e}", path.display())))?;

        let saved = snapshot.records.len();
        info!(path = %path.display(), records = saved, "Index snapshot saved");
        Ok(saved)
    }

    /// Add the records of a snapshot written by [`Self::save_snapshot`].
    ///
    /// A snapshot taken with another embedding dimension or provider fails
    /// with `DimensionMismatch` and leaves the index unchanged.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize, DomainError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::io(format!("failed to read {}: {e}", path.display())))?;
        let snapshot: IndexSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            DomainError::index(format!("invalid index snapshot {}: {e}", path.display()))
        })?;

        if snapshot.dimension != self.dimension {
            return Err(DomainError::dimension_mismatch(self.dimension, snapshot.dimension));
        }
        if snapshot.provider_tag != self.provider_tag {
            return Err(DomainError::dimension_mismatch(
                &self.provider_tag,
                &snapshot.provider_tag,
            ));
        }

        let loaded = self.upsert(snapshot.records).await?;
        info!(path = %path.display(), records = loaded, "Index snapshot loaded");
        Ok(loaded)
    }

    /// Ids of the documents that have at least one stored chunk
    pub async fn document_ids(&self) -> HashSet<String> {
        self.state
            .read()
            .await
            .records
            .values()
            .map(|stored| stored.record.chunk.document_id.clone())
            .collect()
    }

    fn check_vector(&self, vector: &EmbeddingVector) -> Result<(), DomainError> {
        if vector.values.len() != self.dimension || vector.dimension != self.dimension {
            return Err(DomainError::dimension_mismatch(
                self.dimension,
                vector.values.len(),
            ));
        }

        if vector.provider_tag != self.provider_tag {
            return Err(DomainError::dimension_mismatch(
                &self.provider_tag,
                &vector.provider_tag,
            ));
        }

        Ok(())
    }

    fn check_record(&self, record: &VectorRecord) -> Result<(), DomainError> {
        self.check_vector(&record.vector)?;

        match record.vector.chunk_id.as_deref() {
            Some(id) if id != record.chunk.id => Err(DomainError::index(format!(
                "vector for chunk {id} paired with chunk {}",
                record.chunk.id
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_tag(&self) -> &str {
        &self.provider_tag
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, DomainError> {
        for record in &records {
            self.check_record(record)?;
        }

        let written = records.len();
        let mut state = self.state.write().await;

        for record in records {
            let id = record.chunk.id.clone();
            let sequence = match state.records.get(&id) {
                Some(existing) => existing.sequence,
                None => {
                    state.next_sequence += 1;
                    state.next_sequence
                }
            };
            state.records.insert(id, StoredRecord { sequence, record });
        }

        debug!(written, total = state.records.len(), "Upserted vector records");
        Ok(written)
    }

    async fn search(
        &self,
        query: &EmbeddingVector,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<RetrievalResult, DomainError> {
        self.check_vector(query)?;

        if k == 0 {
            return Ok(RetrievalResult::default());
        }

        let state = self.state.read().await;

        let mut hits: Vec<(f32, u64, &VectorRecord)> = state
            .records
            .values()
            .filter(|stored| filter.matches_chunk(&stored.record.chunk))
            .map(|stored| {
                let score = cosine_similarity(&query.values, &stored.record.vector.values);
                (score, stored.sequence, &stored.record)
            })
            .filter(|(score, _, _)| filter.matches_score(*score))
            .collect();

        hits.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        hits.truncate(k);

        let items = hits
            .into_iter()
            .map(|(score, _, record)| ScoredChunk {
                chunk: record.chunk.clone(),
                score,
            })
            .collect();

        Ok(RetrievalResult::new(items))
    }

    async fn delete_all(&self) -> Result<usize, DomainError> {
        let mut state = self.state.write().await;
        let removed = state.records.len();
        state.records.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.state.read().await.records.len())
    }

    async fn existing_ids(&self, chunk_ids: &[String]) -> Result<HashSet<String>, DomainError> {
        let state = self.state.read().await;
        Ok(chunk_ids
            .iter()
            .filter(|id| state.records.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn prune_document(
        &self,
        document_id: &str,
        keep_ids: &HashSet<String>,
    ) -> Result<usize, DomainError> {
        let mut state = self.state.write().await;
        let before = state.records.len();

        state.records.retain(|id, stored| {
            stored.record.chunk.document_id != document_id || keep_ids.contains(id)
        });

        Ok(before - state.records.len())
    }
}
