//! Vector index domain types and trait

mod provider;
mod record;

pub use provider::VectorIndex;
pub use record::{RetrievalResult, ScoredChunk, SearchFilter, VectorRecord};

#[cfg(test)]
pub use provider::MockVectorIndex;
