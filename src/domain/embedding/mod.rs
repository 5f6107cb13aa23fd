//! Embedding provider domain models and traits

mod embedder;
mod provider;
mod vector;

pub use embedder::Embedder;
pub use provider::EmbeddingProvider;
pub use vector::{EmbeddingVector, cosine_similarity};

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
