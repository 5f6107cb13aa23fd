//! Destinations for evaluation records

use std::fmt::Debug;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;
use tracing::info;

use super::{EvaluationRecord, EvaluationSummary};
use crate::domain::DomainError;

/// Receives every record of a run in question order, then the summary
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvaluationSink: Send + Sync + Debug {
    async fn record(&self, record: &EvaluationRecord) -> Result<(), DomainError>;

    async fn finish(&self, summary: &EvaluationSummary) -> Result<(), DomainError>;
}

/// Keeps everything in memory
#[derive(Debug, Default)]
pub struct InMemoryEvaluationSink {
    records: RwLock<Vec<EvaluationRecord>>,
    summaries: RwLock<Vec<EvaluationSummary>>,
}

impl InMemoryEvaluationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<EvaluationRecord> {
        self.records.read().await.clone()
    }

    /// One summary per finished run
    pub async fn summaries(&self) -> Vec<EvaluationSummary> {
        self.summaries.read().await.clone()
    }
}

#[async_trait]
impl EvaluationSink for InMemoryEvaluationSink {
    async fn record(&self, record: &EvaluationRecord) -> Result<(), DomainError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn finish(&self, summary: &EvaluationSummary) -> Result<(), DomainError> {
        self.summaries.write().await.push(summary.clone());
        Ok(())
    }
}

/// Emits records and the summary as structured log events
#[derive(Debug, Default)]
pub struct LoggingEvaluationSink;

#[async_trait]
impl EvaluationSink for LoggingEvaluationSink {
    async fn record(&self, record: &EvaluationRecord) -> Result<(), DomainError> {
        info!(
            question = %record.question,
            faithfulness = record.faithfulness_score,
            relevance = record.relevance_score,
            latency_ms = record.latency_ms,
            served_by = record.served_by.as_deref().unwrap_or("-"),
            error = record.error.as_deref().unwrap_or(""),
            "Question evaluated"
        );
        Ok(())
    }

    async fn finish(&self, summary: &EvaluationSummary) -> Result<(), DomainError> {
        info!(
            total = summary.total,
            failed = summary.failed,
            faithfulness_mean = summary.faithfulness.mean,
            relevance_mean = summary.relevance.mean,
            latency_median_ms = summary.latency_ms.median,
            below_threshold = summary.below_threshold,
            "Evaluation finished"
        );
        Ok(())
    }
}
