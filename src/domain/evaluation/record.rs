//! Labeled questions and per-question evaluation records

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// A question with optional ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledQuestion {
    pub question: String,
    #[serde(default)]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
}

impl LabeledQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            expected_answer: None,
            expected_keywords: Vec::new(),
        }
    }

    pub fn with_expected_answer(mut self, answer: impl Into<String>) -> Self {
        self.expected_answer = Some(answer.into());
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.expected_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Question file contents: `{"questions": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    #[serde(default)]
    pub questions: Vec<LabeledQuestion>,
}

impl QuestionSet {
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json)
            .map_err(|e| DomainError::invalid_config(format!("invalid question file: {}", e)))
    }
}

/// Outcome of one evaluated question. Scores are 0 when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub expected_answer: Option<String>,
    pub actual_answer: String,
    pub retrieved_chunk_ids: Vec<String>,
    pub faithfulness_score: f64,
    pub relevance_score: f64,
    pub latency_ms: u64,
    /// Registry name of the provider that answered
    pub served_by: Option<String>,
    pub error: Option<String>,
}

impl EvaluationRecord {
    /// Record for a question whose query failed
    pub fn failed(question: &LabeledQuestion, latency_ms: u64, error: &DomainError) -> Self {
        Self {
            question: question.question.clone(),
            expected_answer: question.expected_answer.clone(),
            actual_answer: String::new(),
            retrieved_chunk_ids: Vec::new(),
            faithfulness_score: 0.0,
            relevance_score: 0.0,
            latency_ms,
            served_by: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_file_parsing() {
        let set = QuestionSet::from_json(
            r#"{
                "questions": [
                    {"question": "What is the refund period?", "expected_answer": "30 days", "expected_keywords": ["refund", "30"]},
                    {"question": "Wie lange dauert der Versand?"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(set.questions.len(), 2);
        assert_eq!(
            set.questions[0],
            LabeledQuestion::new("What is the refund period?")
                .with_expected_answer("30 days")
                .with_keywords(&["refund", "30"])
        );
        assert!(set.questions[1].expected_keywords.is_empty());
        assert!(QuestionSet::from_json("{}").unwrap().questions.is_empty());
    }

    #[test]
    fn test_malformed_question_file() {
        assert!(matches!(
            QuestionSet::from_json("[1, 2]"),
            Err(DomainError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_failed_record_has_zero_scores() {
        let question = LabeledQuestion::new("q").with_expected_answer("a");
        let record = EvaluationRecord::failed(
            &question,
            12,
            &DomainError::generation_failed("openai", "timeout"),
        );

        assert!(!record.is_success());
        assert_eq!(record.faithfulness_score, 0.0);
        assert_eq!(record.expected_answer.as_deref(), Some("a"));
        assert!(record.error.unwrap().contains("openai"));
    }
}
