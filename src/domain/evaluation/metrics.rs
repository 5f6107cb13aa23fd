//! Key-term overlap scores for answer quality
//!
//! Both scores are fractions of key terms found in the retrieved chunks, so
//! they always lie in `[0, 1]` and grow as more terms are covered.

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

const MIN_TERM_CHARS: usize = 3;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "before", "being", "below", "between", "both", "but", "by", "can", "could",
    "dare", "did", "do", "does", "doing", "during", "each", "few", "for", "from", "further", "had",
    "has", "have", "having", "he", "her", "here", "him", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "just", "may", "me", "might", "more", "most", "must", "my", "need", "no",
    "nor", "not", "of", "on", "once", "only", "or", "other", "ought", "our", "out", "over", "own",
    "same", "shall", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "used", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "why", "will", "with", "would", "you", "your",
];

const GERMAN_STOP_WORDS: &[&str] = &[
    "aber", "alle", "als", "also", "am", "an", "auch", "auf", "aus", "bei", "bin", "bis", "da",
    "dann", "das", "dass", "dem", "den", "denn", "der", "des", "die", "dies", "diese", "dieser",
    "doch", "dort", "du", "durch", "ein", "eine", "einem", "einen", "einer", "eines", "er", "es",
    "für", "gibt", "hat", "hatte", "ich", "ihr", "im", "in", "ist", "ja", "jede", "kann", "kein",
    "lange", "man", "mit", "muss", "nach", "nicht", "noch", "nur", "ob", "oder", "sein", "sich",
    "sie", "sind", "so", "über", "um", "und", "uns", "unter", "vom", "von", "vor", "war", "was",
    "welche", "wenn", "wer", "werden", "wie", "wir", "wird", "wo", "zu", "zum", "zur",
];

fn is_stop_word(word: &str) -> bool {
    ENGLISH_STOP_WORDS.contains(&word) || GERMAN_STOP_WORDS.contains(&word)
}

fn normalize(word: &str) -> Option<String> {
    let word = word.to_lowercase();

    if is_stop_word(&word) {
        return None;
    }

    let chars = word.chars().count();
    if chars < MIN_TERM_CHARS && !word.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    match word.strip_suffix('s') {
        Some(singular) if chars > 3 => Some(singular.to_string()),
        _ => Some(word),
    }
}

/// Normalized content words of `text`
pub fn key_terms(text: &str) -> BTreeSet<String> {
    text.unicode_words().filter_map(normalize).collect()
}

fn corpus_terms<'a>(chunks: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    chunks.into_iter().flat_map(key_terms).collect()
}

fn coverage(terms: &BTreeSet<String>, corpus: &BTreeSet<String>) -> f64 {
    let found = terms.iter().filter(|t| corpus.contains(*t)).count();
    found as f64 / terms.len() as f64
}

/// Share of the query's key terms present in the retrieved chunks.
///
/// Key terms come from `expected_keywords` when given, otherwise from the
/// question and the expected answer. 0 when nothing was retrieved, 1 when
/// there are no key terms to look for.
pub fn relevance_score<'a>(
    question: &str,
    expected_answer: Option<&str>,
    expected_keywords: &[String],
    chunks: impl IntoIterator<Item = &'a str>,
) -> f64 {
    let corpus = corpus_terms(chunks);
    if corpus.is_empty() {
        return 0.0;
    }

    let terms: BTreeSet<String> = if expected_keywords.is_empty() {
        let mut terms = key_terms(question);
        if let Some(expected) = expected_answer {
            terms.extend(key_terms(expected));
        }
        terms
    } else {
        expected_keywords.iter().flat_map(|k| key_terms(k)).collect()
    };

    if terms.is_empty() {
        return 1.0;
    }

    coverage(&terms, &corpus)
}

/// Share of the answer's key terms supported by the retrieved chunks.
///
/// 0 for an empty answer or when nothing was retrieved, 1 for an answer
/// without key terms.
pub fn faithfulness_score<'a>(answer: &str, chunks: impl IntoIterator<Item = &'a str>) -> f64 {
    if answer.trim().is_empty() {
        return 0.0;
    }

    let corpus = corpus_terms(chunks);
    if corpus.is_empty() {
        return 0.0;
    }

    let terms = key_terms(answer);
    if terms.is_empty() {
        return 1.0;
    }

    coverage(&terms, &corpus)
}
