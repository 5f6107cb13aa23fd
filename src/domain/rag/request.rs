use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::language::Language;

/// Which completion providers serve a session, and in which language.
///
/// Resolved once per session: the first completed query pins it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    /// Registry name of the primary completion provider
    pub completion: String,
    /// Registry name of the provider tried once when the primary is unavailable
    #[serde(default)]
    pub fallback: Option<String>,
    /// Forces the instruction template; detected from the question when unset
    #[serde(default)]
    pub language: Option<Language>,
}

impl ProviderSelection {
    pub fn new(completion: impl Into<String>) -> Self {
        Self {
            completion: completion.into(),
            fallback: None,
            language: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

impl fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.completion)?;
        if let Some(fallback) = &self.fallback {
            write!(f, " (fallback {fallback})")?;
        }
        match self.language {
            Some(language) => write!(f, " [{language}]"),
            None => write!(f, " [auto]"),
        }
    }
}

/// One question asked within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub session_id: String,
    pub question: String,
    pub selection: ProviderSelection,
    #[serde(default)]
    pub stream: bool,
}

impl QueryRequest {
    pub fn new(
        session_id: impl Into<String>,
        question: impl Into<String>,
        selection: ProviderSelection,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            selection,
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_display() {
        let selection = ProviderSelection::new("openai")
            .with_fallback("local")
            .with_language(Language::German);

        assert_eq!(selection.to_string(), "openai (fallback local) [de]");
        assert_eq!(ProviderSelection::new("ollama").to_string(), "ollama [auto]");
    }

    #[test]
    fn test_query_request_deserialization() {
        let request: QueryRequest = serde_json::from_str(
            r#"{"session_id": "s1", "question": "Wie lange?", "selection": {"completion": "openai", "language": "german"}}"#,
        )
        .unwrap();

        assert!(!request.stream);
        assert_eq!(request.selection.language, Some(Language::German));
        assert!(request.selection.fallback.is_none());
    }
}
