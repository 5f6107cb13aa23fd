//! Embedding vector types

use serde::{Deserialize, Serialize};

/// A vector produced by an embedding provider.
///
/// `chunk_id` is set for vectors stored in the index and left empty for
/// query vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub chunk_id: Option<String>,
    pub values: Vec<f32>,
    pub dimension: usize,
    pub provider_tag: String,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, provider_tag: impl Into<String>) -> Self {
        Self {
            chunk_id: None,
            dimension: values.len(),
            values,
            provider_tag: provider_tag.into(),
        }
    }

    pub fn with_chunk_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    /// Calculate cosine similarity with another vector
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> f32 {
        cosine_similarity(&self.values, &other.values)
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_vector_dimension_tracks_values() {
        let vector = EmbeddingVector::new(vec![0.1, 0.2, 0.3], "hashing/256").with_chunk_id("c1");
        assert_eq!(vector.dimension, 3);
        assert_eq!(vector.chunk_id.as_deref(), Some("c1"));
        assert_eq!(vector.provider_tag, "hashing/256");
    }
}
