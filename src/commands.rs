use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, mask_secret};
use crate::gemini::GeminiClient;
use crate::ingest::{IngestPipeline, IngestReport};
use crate::rag::{RagService, RetrievalSettings};
use crate::vector_store::QdrantClient;
use crate::{RagError, Result};

fn embedding_progress_bar() -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {wide_bar}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}

/// Rebuild the vector collection from the documents directory
#[inline]
pub async fn ingest(config: Arc<Config>) -> Result<IngestReport> {
    println!("{}", style("--- Starting Content Ingestion ---").bold().cyan());
    println!("Connecting to Qdrant...");
    println!("  Qdrant URL: {}", style(&config.qdrant.url).cyan());
    println!(
        "  Qdrant API Key (masked): {}",
        style(mask_secret(&config.qdrant.api_key)).dim()
    );
    println!("  Documents: {}", style(config.ingest.docs_dir.display()).cyan());

    let gemini = Arc::new(GeminiClient::new(&config.gemini)?);
    let qdrant = Arc::new(QdrantClient::new(&config.qdrant)?);
    let pipeline = IngestPipeline::new(gemini, qdrant, Arc::clone(&config));

    let report = tokio::task::spawn_blocking(move || {
        let progress = embedding_progress_bar();
        pipeline.run(&progress)
    })
    .await
    .map_err(|e| RagError::Other(anyhow::anyhow!("Ingestion task failed: {}", e)))?;

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            println!("{} {}", style("✗ Ingestion failed:").red().bold(), e);
            return Err(e);
        }
    };

    print_report(&report, &config.qdrant.collection);
    Ok(report)
}

fn print_report(report: &IngestReport, collection: &str) {
    println!();
    println!("{}", style("✓ Ingestion complete").green().bold());
    println!("  Files processed: {}", report.files);
    println!("  Chunks created: {}", report.chunks);
    println!("  Embeddings generated: {}", report.embeddings);
    println!(
        "  Records upserted into '{}': {}",
        collection,
        style(report.upserted).cyan()
    );
    if report.truncated > 0 {
        println!(
            "  {} {} entries dropped to match embeddings with chunks",
            style("⚠").yellow(),
            report.truncated
        );
    }
    if let Some(error) = &report.embedding_error {
        println!(
            "  {} Embedding stopped early: {}",
            style("⚠").yellow(),
            error
        );
    }
}

/// Start the query service
#[inline]
pub async fn serve(config: Arc<Config>) -> Result<()> {
    let gemini = Arc::new(GeminiClient::new(&config.gemini)?);
    let qdrant = Arc::new(QdrantClient::new(&config.qdrant)?);

    info!(
        "Answering from collection '{}' with model '{}'",
        config.qdrant.collection,
        gemini.generation_model()
    );

    let embedder: Arc<GeminiClient> = Arc::clone(&gemini);
    let rag = RagService::new(
        embedder,
        qdrant,
        gemini,
        RetrievalSettings::from_config(&config),
    );

    println!(
        "{} http://{}",
        style("Query service starting on").bold().green(),
        config.bind_address()
    );

    crate::server::serve(config, Arc::new(rag)).await
}

/// Print the effective configuration with secrets masked
#[inline]
pub fn show_config(config: &Config, source: Option<&Path>) {
    println!("{}", style("📋 Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Qdrant:").bold().yellow());
    println!("  URL: {}", style(display_or_unset(&config.qdrant.url)).cyan());
    println!("  API Key: {}", style(mask_secret(&config.qdrant.api_key)).cyan());
    println!("  Collection: {}", style(&config.qdrant.collection).cyan());
    println!("  Vector Size: {}", style(config.qdrant.vector_size).cyan());

    println!();
    println!("{}", style("Gemini:").bold().yellow());
    println!("  API Key: {}", style(mask_secret(&config.gemini.api_key)).cyan());
    println!("  Embedding Model: {}", style(&config.gemini.embedding_model).cyan());
    println!("  Generation Model: {}", style(&config.gemini.generation_model).cyan());

    println!();
    println!("{}", style("Ingestion:").bold().yellow());
    println!("  Documents: {}", style(config.ingest.docs_dir.display()).cyan());
    println!("  Batch Size: {}", style(config.ingest.batch_size).cyan());
    println!("  Batch Delay: {} ms", style(config.ingest.batch_delay_ms).cyan());
    println!("  Chunk Size: {}", style(config.chunking.chunk_size).cyan());
    println!("  Chunk Overlap: {}", style(config.chunking.chunk_overlap).cyan());

    println!();
    println!("{}", style("Query Service:").bold().yellow());
    println!("  Bind Address: {}", style(config.bind_address()).cyan());
    println!(
        "  Allowed Origins: {}",
        style(config.server.allowed_origins.join(", ")).cyan()
    );
    println!("  Top K: {}", style(config.retrieval.top_k).cyan());
    println!(
        "  No Context Policy: {:?}",
        style(config.retrieval.no_context_policy).cyan()
    );

    let missing = config.missing_required();
    if !missing.is_empty() {
        println!();
        println!(
            "{} {}",
            style("Missing:").red().bold(),
            missing.join(", ")
        );
    } else if let Err(e) = config.validate() {
        println!();
        println!("{} {}", style("Invalid:").red().bold(), e);
    }

    println!();
    match source {
        Some(path) => println!("Config file: {}", style(path.display()).dim()),
        None => println!("Config file: {}", style("(none, environment only)").dim()),
    }
}

fn display_or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "(not set)"
    } else {
        value
    }
}
