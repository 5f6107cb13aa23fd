//! Answer quality evaluation
//!
//! Labeled questions are replayed through the orchestrator, scored by
//! key-term overlap with the retrieved context, and aggregated into a report.

mod harness;
mod metrics;
mod record;
mod sink;
mod statistics;

pub use harness::{EvaluationConfig, EvaluationHarness, EvaluationReport};
pub use metrics::{faithfulness_score, key_terms, relevance_score};
pub use record::{EvaluationRecord, LabeledQuestion, QuestionSet};
pub use sink::{EvaluationSink, InMemoryEvaluationSink, LoggingEvaluationSink};
pub use statistics::{EvaluationSummary, MetricSummary, mean, median, std_dev, variance};

#[cfg(test)]
pub use sink::MockEvaluationSink;
