use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api;
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::{EmbeddingIndex, IndexError};
use crate::report::{ReportRequest, ReportService};
use crate::retrieval::Retriever;

const PREVIEW_CHARS: usize = 240;

/// Collect, index and summarise the request's interests into a report
#[inline]
pub async fn generate_report(base_dir: &Path, request: ReportRequest) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    check_ollama(&config)?;

    let keywords = request.keywords();
    if keywords.is_empty() {
        anyhow::bail!("At least one non-empty --interest is required");
    }

    let service = ReportService::from_config(config).context("Failed to set up report service")?;
    let cancel = cancel_on_ctrl_c();

    println!("🚀 Generating report for: {}", keywords.join(", "));
    let outcome = service.generate(&request, &cancel).await?;

    println!();
    println!("{}", style("✅ Report complete").bold().green());
    println!("   Run: {}", outcome.run_id);
    println!(
        "   Sources: {}/{} succeeded ({} records, {} failures)",
        outcome.collection.succeeded,
        outcome.collection.attempted,
        outcome.collection.records,
        outcome.collection.failures
    );
    println!(
        "   Chunks: {} indexed, {} used as context",
        outcome.chunk_count, outcome.retrieved_count
    );
    if outcome.repaired {
        println!("   ⚠️  Model output needed repair");
    }
    println!("   JSON: {}", outcome.report_path.display());

    let summary = outcome.text_report();
    if !summary.is_empty() {
        println!();
        println!("{}", style("📝 Summary").bold());
        println!("{}", summary);
    }

    Ok(())
}

/// Query the index left by the last run without rebuilding it
#[inline]
pub async fn search_index(base_dir: &Path, query: &str, k: usize) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let embedder: Arc<dyn Embedder> =
        Arc::new(OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?);

    let index = match EmbeddingIndex::load(&config.embeddings_dir(), embedder).await {
        Ok(index) => index,
        Err(IndexError::NotFound(dir)) => {
            println!("❌ No index found at {}", dir.display());
            println!("Use 'market-brief generate' to build one.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let manifest = index.manifest().clone();
    let chunks = Retriever::new(&index, config.retrieval.clone())
        .retrieve_chunks(query, k)
        .await?;
    index.close();

    println!(
        "🔎 {} result(s) for '{}' ({} chunks, built {})",
        chunks.len(),
        query,
        manifest.chunk_count,
        manifest.built_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!();

    for (rank, chunk) in chunks.iter().enumerate() {
        println!(
            "{}. {} {} {}",
            rank + 1,
            style(format!("[{}]", chunk.source)).cyan(),
            style(&chunk.keyword).bold(),
            style(format!("similarity {:.3}", chunk.similarity)).dim()
        );
        println!("   {}", preview(&chunk.text));
        println!();
    }

    Ok(())
}

/// Serve the HTTP API until interrupted
#[inline]
pub async fn serve_api(base_dir: &Path, host: &str, port: u16) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    check_ollama(&config)?;

    let service =
        Arc::new(ReportService::from_config(config).context("Failed to set up report service")?);
    let shutdown = cancel_on_ctrl_c();

    println!("🌐 Serving on http://{}:{}", host, port);
    println!("Press Ctrl+C to stop the server");

    api::serve(service, host, port, shutdown).await?;

    println!("✅ Shutdown complete");
    Ok(())
}

/// Fail early when Ollama is unreachable; warn when the model looks unavailable
fn check_ollama(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;

    if let Err(e) = client.ping() {
        error!("Failed to connect to Ollama: {:#}", e);
        println!(
            "Error: Cannot connect to Ollama at {}:{}",
            config.ollama.host, config.ollama.port
        );
        println!("Please ensure Ollama is running and accessible.");
        println!("Use 'market-brief config' to update connection settings.");
        return Err(e);
    }

    match client.validate_model() {
        Ok(()) => info!(
            "Ollama connected at {}:{} with model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => {
            warn!("Ollama is reachable but unhealthy: {:#}", e);
            println!("Warning: Ollama may not be ready. Embedding may fail.");
        }
    }

    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n📴 Received interrupt signal, shutting down...");
            child.cancel();
        }
    });
    token
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    }
}
