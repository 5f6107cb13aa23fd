//! Source documents handed to the chunker

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::language::{Language, detect_language};

const DOCUMENT_ID_LEN: usize = 16;

/// A document loaded for ingestion.
///
/// The id is derived from the source identifier, so re-ingesting the same
/// file always addresses the same set of chunks in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_identifier: String,
    pub raw_text: String,
    pub language: Option<Language>,
}

impl Document {
    pub fn new(source_identifier: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let source_identifier = source_identifier.into();

        Self {
            id: document_id(&source_identifier),
            source_identifier,
            raw_text: raw_text.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Fill in `language` from the text if it was not set explicitly
    pub fn with_detected_language(mut self) -> Self {
        if self.language.is_none() {
            self.language = Some(detect_language(&self.raw_text));
        }
        self
    }

    /// Short display name: the last path segment of the source identifier
    pub fn source_name(&self) -> &str {
        source_name(&self.source_identifier)
    }
}

/// Deterministic document id from a source identifier
pub fn document_id(source_identifier: &str) -> String {
    let digest = Sha256::digest(source_identifier.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(DOCUMENT_ID_LEN);
    id
}

pub fn source_name(source_identifier: &str) -> &str {
    source_identifier
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(source_identifier)
}
