//! Aggregate statistics over evaluation records

use serde::{Deserialize, Serialize};

use super::EvaluationRecord;

/// Calculate mean of a sample
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Calculate variance of a sample (sample variance, n-1 denominator)
pub fn variance(sample: &[f64]) -> f64 {
    if sample.len() < 2 {
        return 0.0;
    }

    let m = mean(sample);
    let n = sample.len() as f64;
    sample.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0)
}

/// Calculate standard deviation of a sample
pub fn std_dev(sample: &[f64]) -> f64 {
    variance(sample).sqrt()
}

/// Middle value, averaging the two middle values of an even-sized sample
pub fn median(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Distribution of one metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl MetricSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        Self {
            mean: mean(samples),
            median: median(samples),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: std_dev(samples),
        }
    }
}

/// Aggregates over a run. Metric distributions cover successful records only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub faithfulness: MetricSummary,
    pub relevance: MetricSummary,
    pub latency_ms: MetricSummary,
    pub faithfulness_threshold: f64,
    /// Share of successful records whose faithfulness is below the threshold
    pub below_threshold: f64,
}

impl EvaluationSummary {
    pub fn from_records(records: &[EvaluationRecord], faithfulness_threshold: f64) -> Self {
        let succeeded: Vec<&EvaluationRecord> =
            records.iter().filter(|r| r.is_success()).collect();

        let faithfulness: Vec<f64> = succeeded.iter().map(|r| r.faithfulness_score).collect();
        let relevance: Vec<f64> = succeeded.iter().map(|r| r.relevance_score).collect();
        let latency: Vec<f64> = succeeded.iter().map(|r| r.latency_ms as f64).collect();

        let below = faithfulness
            .iter()
            .filter(|score| **score < faithfulness_threshold)
            .count();
        let below_threshold = if faithfulness.is_empty() {
            0.0
        } else {
            below as f64 / faithfulness.len() as f64
        };

        Self {
            total: records.len(),
            succeeded: succeeded.len(),
            failed: records.len() - succeeded.len(),
            faithfulness: MetricSummary::from_samples(&faithfulness),
            relevance: MetricSummary::from_samples(&relevance),
            latency_ms: MetricSummary::from_samples(&latency),
            faithfulness_threshold,
            below_threshold,
        }
    }
}
