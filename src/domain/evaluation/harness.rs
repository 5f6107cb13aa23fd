//! Batch evaluation of the orchestrator against labeled questions

use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::metrics::{faithfulness_score, relevance_score};
use super::{EvaluationRecord, EvaluationSink, EvaluationSummary, LabeledQuestion};
use crate::domain::DomainError;
use crate::domain::rag::{ProviderSelection, QueryRequest, RagAnswer, RagOrchestrator};

/// Evaluation run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Questions in flight at once
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_faithfulness_threshold")]
    pub faithfulness_threshold: f64,
}

fn default_parallelism() -> usize {
    4
}

fn default_faithfulness_threshold() -> f64 {
    0.5
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            faithfulness_threshold: default_faithfulness_threshold(),
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.parallelism == 0 {
            return Err(DomainError::invalid_config(
                "parallelism must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.faithfulness_threshold) {
            return Err(DomainError::invalid_config(format!(
                "faithfulness_threshold must be between 0 and 1, got {}",
                self.faithfulness_threshold
            )));
        }
        Ok(())
    }
}

/// Records of a run, in question order, with their aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: String,
    pub records: Vec<EvaluationRecord>,
    pub summary: EvaluationSummary,
}

/// Replays questions through the orchestrator and scores the answers.
///
/// Each question gets its own session, removed once it is scored, so
/// questions never see each other's history. The index is only read.
#[derive(Debug, Clone)]
pub struct EvaluationHarness {
    orchestrator: Arc<RagOrchestrator>,
    selection: ProviderSelection,
    sink: Arc<dyn EvaluationSink>,
    config: EvaluationConfig,
}

impl EvaluationHarness {
    pub fn new(
        orchestrator: Arc<RagOrchestrator>,
        selection: ProviderSelection,
        sink: Arc<dyn EvaluationSink>,
        config: EvaluationConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        Ok(Self {
            orchestrator,
            selection,
            sink,
            config,
        })
    }

    /// Evaluate every question. A failing question becomes a failed record;
    /// only sink errors abort the run.
    #[instrument(skip(self, questions), fields(questions = questions.len(), selection = %self.selection))]
    pub async fn run(&self, questions: Vec<LabeledQuestion>) -> Result<EvaluationReport, DomainError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, parallelism = self.config.parallelism, "Evaluation started");

        let mut records = Vec::with_capacity(questions.len());
        {
            let mut evaluated = std::pin::pin!(
                stream::iter(questions.iter().enumerate())
                    .map(|(position, question)| self.evaluate(&run_id, position, question))
                    .buffered(self.config.parallelism)
            );

            while let Some(record) = evaluated.next().await {
                self.sink.record(&record).await?;
                records.push(record);
            }
        }

        let summary = EvaluationSummary::from_records(&records, self.config.faithfulness_threshold);
        self.sink.finish(&summary).await?;

        info!(
            run_id = %run_id,
            failed = summary.failed,
            faithfulness_mean = summary.faithfulness.mean,
            relevance_mean = summary.relevance.mean,
            "Evaluation finished"
        );

        Ok(EvaluationReport {
            run_id,
            records,
            summary,
        })
    }

    async fn evaluate(
        &self,
        run_id: &str,
        position: usize,
        question: &LabeledQuestion,
    ) -> EvaluationRecord {
        let session_id = format!("eval-{run_id}-{position}");

        let started = Instant::now();
        let result = self.ask(&session_id, &question.question).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        self.orchestrator.sessions().remove(&session_id).await;

        match result {
            Ok(answer) => score(question, answer, latency_ms),
            Err(error) => {
                warn!(position, error = %error, "Question failed");
                EvaluationRecord::failed(question, latency_ms, &error)
            }
        }
    }

    async fn ask(&self, session_id: &str, question: &str) -> Result<RagAnswer, DomainError> {
        self.orchestrator
            .query(QueryRequest::new(session_id, question, self.selection.clone()))
            .await?
            .into_answer()
            .await
    }
}

fn score(question: &LabeledQuestion, answer: RagAnswer, latency_ms: u64) -> EvaluationRecord {
    let chunks = || answer.retrieval.iter().map(|scored| scored.chunk.text.as_str());

    let relevance = relevance_score(
        &question.question,
        question.expected_answer.as_deref(),
        &question.expected_keywords,
        chunks(),
    );
    let faithfulness = faithfulness_score(&answer.answer, chunks());

    EvaluationRecord {
        question: question.question.clone(),
        expected_answer: question.expected_answer.clone(),
        actual_answer: answer.answer.clone(),
        retrieved_chunk_ids: answer.citations.clone(),
        faithfulness_score: faithfulness,
        relevance_score: relevance,
        latency_ms,
        served_by: Some(answer.served_by.clone()),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::{Embedder, MockEmbeddingProvider};
    use crate::domain::evaluation::{InMemoryEvaluationSink, MockEvaluationSink};
    use crate::domain::ingestion::{ChunkingConfig, Document};
    use crate::domain::llm::{MockLlmProvider, ProviderRegistry};
    use crate::domain::rag::RagConfig;
    use crate::infrastructure::index::InMemoryVectorIndex;
    use crate::infrastructure::ingestion::IngestionPipeline;

    async fn orchestrator(answer: &str) -> Arc<RagOrchestrator> {
        let index = Arc::new(InMemoryVectorIndex::new(64, "mock"));
        let embedder = Embedder::new(Arc::new(MockEmbeddingProvider::new("mock", 64)));

        IngestionPipeline::new(embedder.clone(), index.clone())
            .unwrap()
            .ingest(
                Document::new(
                    "policy.md",
                    "# Refunds\n\nRefund period: 30 days from delivery.\n\n# Shipping\n\nShipping takes 5 business days.",
                ),
                &ChunkingConfig::new(1000, 200),
            )
            .await
            .unwrap();

        let providers = ProviderRegistry::new()
            .with_provider("openai", Arc::new(MockLlmProvider::new("openai").with_answer(answer)));

        Arc::new(RagOrchestrator::new(index, embedder, providers, RagConfig::default()).unwrap())
    }

    fn questions() -> Vec<LabeledQuestion> {
        vec![
            LabeledQuestion::new("What is the refund period?")
                .with_expected_answer("30 days")
                .with_keywords(&["refund", "30"]),
            LabeledQuestion::new("   "),
            LabeledQuestion::new("How long does shipping take?"),
        ]
    }

    #[tokio::test]
    async fn test_run_scores_questions_in_order() {
        let rag = orchestrator("The refund period is 30 days.").await;
        let sink = Arc::new(InMemoryEvaluationSink::new());
        let harness = EvaluationHarness::new(
            rag.clone(),
            ProviderSelection::new("openai"),
            sink.clone(),
            EvaluationConfig {
                parallelism: 2,
                ..Default::default()
            },
        )
        .unwrap();

        let report = harness.run(questions()).await.unwrap();

        let asked: Vec<&str> = report.records.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(
            asked,
            vec!["What is the refund period?", "   ", "How long does shipping take?"]
        );

        let first = &report.records[0];
        assert_eq!(first.relevance_score, 1.0);
        assert_eq!(first.faithfulness_score, 1.0);
        assert_eq!(first.served_by.as_deref(), Some("openai"));
        assert!(!first.retrieved_chunk_ids.is_empty());

        assert!(report.records[1].error.is_some());
        assert_eq!(report.records[1].faithfulness_score, 0.0);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(sink.records().await, report.records);
        assert_eq!(sink.summaries().await, vec![report.summary.clone()]);

        assert!(rag.sessions().is_empty().await);
        assert_eq!(rag.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_answer_is_below_threshold() {
        let rag = orchestrator("Warranty claims need a receipt.").await;
        let harness = EvaluationHarness::new(
            rag,
            ProviderSelection::new("openai"),
            Arc::new(InMemoryEvaluationSink::new()),
            EvaluationConfig::default(),
        )
        .unwrap();

        let report = harness
            .run(vec![LabeledQuestion::new("What is the refund period?")])
            .await
            .unwrap();

        assert_eq!(report.records[0].faithfulness_score, 0.0);
        assert_eq!(report.summary.below_threshold, 1.0);
    }

    #[tokio::test]
    async fn test_each_run_reports_its_own_id() {
        let harness = EvaluationHarness::new(
            orchestrator("30 days").await,
            ProviderSelection::new("openai"),
            Arc::new(InMemoryEvaluationSink::new()),
            EvaluationConfig::default(),
        )
        .unwrap();

        let first = harness.run(questions()).await.unwrap();
        let second = harness.run(questions()).await.unwrap();

        assert!(uuid::Uuid::parse_str(&first.run_id).is_ok());
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.records.len(), 3);
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_run() {
        let mut sink = MockEvaluationSink::new();
        sink.expect_record()
            .times(1)
            .returning(|_| Err(DomainError::io("disk full")));
        sink.expect_finish().never();

        let harness = EvaluationHarness::new(
            orchestrator("30 days").await,
            ProviderSelection::new("openai"),
            Arc::new(sink),
            EvaluationConfig {
                parallelism: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let result = harness.run(questions()).await;

        assert!(matches!(result, Err(DomainError::Io { .. })));
    }

    #[test]
    fn test_config_validation() {
        assert!(EvaluationConfig::default().validate().is_ok());
        assert!(
            EvaluationConfig {
                parallelism: 0,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            EvaluationConfig {
                faithfulness_threshold: 1.5,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
    }
}
