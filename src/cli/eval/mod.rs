//! Eval command - scores answers against a labeled question file

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use crate::domain::evaluation::{
    EvaluationHarness, EvaluationReport, LoggingEvaluationSink, MetricSummary,
};
use crate::infrastructure::evaluation::{load_questions, write_report};

/// Arguments for the eval command
#[derive(Args, Clone)]
pub struct EvalArgs {
    /// Directory of .txt/.md documents to index
    #[arg(long)]
    pub docs: PathBuf,

    /// JSON file of the form {"questions": [...]}
    #[arg(long)]
    pub questions: PathBuf,

    /// Write the full report here as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Completion provider name (overrides config)
    #[arg(long)]
    pub provider: Option<String>,

    /// Questions evaluated concurrently (overrides config)
    #[arg(long)]
    pub parallelism: Option<usize>,
}

/// Run the eval command
pub async fn run(args: EvalArgs) -> anyhow::Result<()> {
    let config = super::init()?;

    let selection = config.completion.selection(args.provider.as_deref());
    let questions = load_questions(&args.questions).await?;
    if questions.is_empty() {
        anyhow::bail!("{} contains no questions", args.questions.display());
    }

    let mut evaluation = config.evaluation.clone();
    if let Some(parallelism) = args.parallelism {
        evaluation.parallelism = parallelism;
    }

    let rag = super::build_orchestrator(&config, &args.docs, &selection).await?;
    let harness = EvaluationHarness::new(
        rag,
        selection,
        Arc::new(LoggingEvaluationSink),
        evaluation,
    )?;

    let report = harness.run(questions).await?;
    print_report(&report);

    if let Some(output) = &args.output {
        write_report(output, &report).await?;
        println!("\nReport written to {}", output.display());
    }

    Ok(())
}

fn print_report(report: &EvaluationReport) {
    for (i, record) in report.records.iter().enumerate() {
        match &record.error {
            Some(error) => println!("{:>3}. FAILED {} ({})", i + 1, record.question, error),
            None => println!(
                "{:>3}. faithfulness {:.2}  relevance {:.2}  {:>6} ms  {}",
                i + 1,
                record.faithfulness_score,
                record.relevance_score,
                record.latency_ms,
                record.question
            ),
        }
    }

    let summary = &report.summary;
    println!(
        "\n{} questions, {} failed, {:.0}% below faithfulness {:.2}",
        summary.total,
        summary.failed,
        summary.below_threshold * 100.0,
        summary.faithfulness_threshold
    );
    print_metric("faithfulness", &summary.faithfulness);
    print_metric("relevance", &summary.relevance);
    print_metric("latency_ms", &summary.latency_ms);
}

fn print_metric(name: &str, metric: &MetricSummary) {
    println!(
        "  {:<12} mean {:>8.3}  median {:>8.3}  min {:>8.3}  max {:>8.3}  std {:>8.3}",
        name, metric.mean, metric.median, metric.min, metric.max, metric.std_dev
    );
}
