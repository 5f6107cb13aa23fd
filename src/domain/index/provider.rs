//! Vector index trait

use std::collections::HashSet;
use std::fmt::Debug;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::{RetrievalResult, SearchFilter, VectorRecord};
use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingVector;

/// Store of chunk vectors supporting nearest-neighbour search.
///
/// An index is bound to one embedding `dimension` and `provider_tag`; records
/// and queries that disagree with either are rejected with `DimensionMismatch`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync + Debug {
    /// Vector length every record must have
    fn dimension(&self) -> usize;

    /// Embedding provider tag every record must carry
    fn provider_tag(&self) -> &str;

    /// Insert or replace records by chunk id; returns the number written.
    /// The whole batch is validated before anything is written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, DomainError>;

    /// At most `k` records by descending similarity, ties in insertion order
    async fn search(
        &self,
        query: &EmbeddingVector,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<RetrievalResult, DomainError>;

    /// Remove every record; returns how many were removed
    async fn delete_all(&self) -> Result<usize, DomainError>;

    async fn count(&self) -> Result<usize, DomainError>;

    /// Which of `chunk_ids` are already stored
    async fn existing_ids(&self, chunk_ids: &[String]) -> Result<HashSet<String>, DomainError>;

    /// Remove a document's records whose chunk ids are not in `keep_ids`
    async fn prune_document(
        &self,
        document_id: &str,
        keep_ids: &HashSet<String>,
    ) -> Result<usize, DomainError>;
}
