//! Language detection for prompt template selection

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Languages with a dedicated instruction template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    German,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::German => "de",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Language::English),
            "de" | "german" | "deutsch" => Some(Language::German),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

const GERMAN_INDICATORS: &[&str] = &[
    "der", "die", "das", "und", "ist", "sind", "ein", "eine", "für", "mit", "auf", "nicht", "ich",
    "du", "wir", "sie", "kann", "wird", "haben", "werden", "über", "nach", "wie", "was", "wann",
    "welche", "gibt", "lange",
];

/// Guess the language of `text` from common function words.
///
/// German wins when at least two indicator words appear, or when they make
/// up more than a fifth of the words. Everything else is English.
pub fn detect_language(text: &str) -> Language {
    let words: Vec<String> = text.unicode_words().map(|w| w.to_lowercase()).collect();

    if words.is_empty() {
        return Language::English;
    }

    let hits = words
        .iter()
        .filter(|w| GERMAN_INDICATORS.contains(&w.as_str()))
        .count();

    if hits >= 2 || hits as f64 / words.len() as f64 > 0.2 {
        Language::German
    } else {
        Language::English
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        assert_eq!(detect_language("What is the refund period?"), Language::English);
    }

    #[test]
    fn test_detects_german() {
        assert_eq!(
            detect_language("Wie lange ist die Rückgabefrist für Bestellungen?"),
            Language::German
        );
    }

    #[test]
    fn test_single_indicator_in_short_text() {
        assert_eq!(detect_language("Rückgabefrist und Kosten"), Language::German);
    }

    #[test]
    fn test_empty_defaults_to_english() {
        assert_eq!(detect_language(""), Language::English);
        assert_eq!(detect_language("   "), Language::English);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("DE"), Some(Language::German));
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::German.to_string(), "de");
    }
}
