//! CLI module for docqa
//!
//! Provides subcommands over a directory of documents loaded into an
//! in-memory index, optionally kept between runs as a snapshot:
//! - `ask`: answer questions, once or interactively
//! - `eval`: score answers against a labeled question file

pub mod ask;
pub mod eval;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::DomainError;
use crate::domain::embedding::Embedder;
use crate::domain::index::VectorIndex;
use crate::domain::rag::{ProviderSelection, RagOrchestrator};
use crate::infrastructure::embedding::EmbeddingProviderFactory;
use crate::infrastructure::index::InMemoryVectorIndex;
use crate::infrastructure::ingestion::{IngestionPipeline, load_directory};
use crate::infrastructure::llm::{ApiKeys, LlmProviderFactory};
use crate::infrastructure::logging;

/// docqa - Question answering over your own documents
#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ask questions about a document directory
    Ask(ask::AskArgs),

    /// Evaluate answer quality against a question file
    Eval(eval::EvalArgs),
}

/// Load `.env` and configuration, then start logging
fn init() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init_logging(&config.logging);
    config.validate()?;

    Ok(config)
}

/// Index `docs` and build an orchestrator serving `selection`
async fn build_orchestrator(
    config: &AppConfig,
    docs: &Path,
    selection: &ProviderSelection,
) -> anyhow::Result<Arc<RagOrchestrator>> {
    let keys = ApiKeys::from_env();

    let provider =
        EmbeddingProviderFactory::create(&config.embedding.provider, &keys, config.embedding.timeout())?;
    let embedder = Embedder::new(provider)
        .with_retry(config.embedding.retry.clone())
        .with_timeout(config.embedding.timeout());
    let index = Arc::new(InMemoryVectorIndex::new(
        embedder.dimension(),
        embedder.provider_tag(),
    ));

    if let Some(path) = &config.index.snapshot_path {
        restore_snapshot(&index, path).await?;
    }

    let documents = load_directory(docs).await?;
    if documents.is_empty() {
        anyhow::bail!("no supported documents found in {}", docs.display());
    }

    let reports = IngestionPipeline::new(embedder.clone(), index.clone())?
        .ingest_all(documents, &config.chunking)
        .await?;

    // Documents removed from the corpus since the snapshot was taken
    let current: HashSet<String> = reports.iter().map(|r| r.document_id.clone()).collect();
    let mut removed = 0;
    for stale in index.document_ids().await.difference(&current) {
        removed += index.prune_document(stale, &HashSet::new()).await?;
    }

    let chunks: usize = reports.iter().map(|r| r.chunks).sum();
    let embedded: usize = reports.iter().map(|r| r.embedded).sum();
    info!(documents = reports.len(), chunks, embedded, removed, "Corpus indexed");

    if let Some(path) = &config.index.snapshot_path {
        index.save_snapshot(path).await?;
    }

    let providers = LlmProviderFactory::create_registry(
        config.completion.providers_for(selection)?,
        &keys,
        config.completion.timeout(),
        &config.completion.retry,
    )?;

    let orchestrator = RagOrchestrator::new(index, embedder, providers, config.retrieval.clone())?;
    Ok(Arc::new(orchestrator))
}

/// Load a saved index. A snapshot made with another embedding setup, or one
/// that cannot be parsed, is ignored and the corpus is indexed from scratch.
async fn restore_snapshot(index: &InMemoryVectorIndex, path: &Path) -> anyhow::Result<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }

    match index.load_snapshot(path).await {
        Ok(_) => Ok(()),
        Err(error @ (DomainError::DimensionMismatch { .. } | DomainError::Index { .. })) => {
            warn!(path = %path.display(), error = %error, "Ignoring index snapshot");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
