//! Question files and report output for evaluation runs

use std::path::Path;

use tracing::info;

use crate::domain::DomainError;
use crate::domain::evaluation::{EvaluationReport, LabeledQuestion, QuestionSet};

/// Read a `{"questions": [...]}` file
pub async fn load_questions(path: &Path) -> Result<Vec<LabeledQuestion>, DomainError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DomainError::io(format!("failed to read {}: {}", path.display(), e)))?;

    let set = QuestionSet::from_json(&json)?;
    info!(path = %path.display(), questions = set.questions.len(), "Questions loaded");
    Ok(set.questions)
}

/// Write a report as pretty-printed JSON
pub async fn write_report(path: &Path, report: &EvaluationReport) -> Result<(), DomainError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| DomainError::internal(format!("failed to serialize report: {}", e)))?;

    tokio::fs::write(path, json)
        .await
        .map_err(|e| DomainError::io(format!("failed to write {}: {}", path.display(), e)))?;

    info!(path = %path.display(), records = report.records.len(), "Report written");
    Ok(())
}
