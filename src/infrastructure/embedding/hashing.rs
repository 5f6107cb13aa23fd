//! Offline feature-hashing embedder

use std::collections::HashMap;

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;

pub const DEFAULT_HASHING_DIMENSION: usize = 384;
const MAX_BATCH_SIZE: usize = 256;

/// Deterministic bag-of-words embedder that needs no network.
///
/// Each distinct lower-cased word adds its term frequency to the bucket
/// chosen by a djb2 hash; the vector is then L2-normalized. Texts sharing
/// vocabulary land close together, which is enough for keyword-grade
/// retrieval and for reproducible tests.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
    tag: String,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Result<Self, DomainError> {
        if dimension == 0 {
            return Err(DomainError::invalid_config(
                "hashing embedder dimension must be greater than 0",
            ));
        }

        Ok(Self {
            dimension,
            tag: format!("hashing/{dimension}"),
        })
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered.unicode_words() {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            vector[djb2(term) % self.dimension] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn provider_tag(&self) -> &str {
        &self.tag
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}
