use anyhow::Result;
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::config::Config;
use crate::search::{create_embedder, Chunker, Indexer, ParquetStore};

static INDEXING: Emoji<'_, '_> = Emoji("📊 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");
static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");

pub async fn run_build(
    config: &Config,
    document: Option<&Path>,
    store: Option<&Path>,
    force: bool,
) -> Result<()> {
    let document = document.unwrap_or(config.paths.document.as_path());
    let store_path = super::store_path(config, store);

    let embedder = create_embedder(&config.embedding)?;
    let chunker = Chunker::from_config(&config.chunking)?;
    let indexer = Indexer::new(embedder, chunker, &config.embedding);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("{}Indexing {}...", INDEXING, document.display()));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = indexer.build(document, &store_path, force).await;
    pb.finish_and_clear();
    let result = result?;

    if result.skipped {
        println!(
            "{}Vector store already exists at {}. Use --force to rebuild.",
            INFO,
            style(store_path.display()).green()
        );
        return Ok(());
    }

    println!("\n{}Indexing complete!\n", SUCCESS);
    println!("  Chunks:          {}", style(result.chunks).cyan());
    println!("  Dimension:       {}", style(result.dimension).cyan());
    println!("  Store:           {}", style(store_path.display()).green());
    println!(
        "  Elapsed:         {}",
        style(format!("{:.2?}", result.elapsed)).dim()
    );

    Ok(())
}

pub fn run_info(config: &Config, store: Option<&Path>) -> Result<()> {
    let store_path = super::store_path(config, store);

    if !store_path.exists() {
        println!("{}No vector store found at {}", INFO, store_path.display());
        println!("Run `docrag build` to create it.");
        return Ok(());
    }

    let stats = ParquetStore::new(&store_path).stats()?;

    println!("\n{}Store: {}\n", INFO, store_path.display());
    println!("  Records:         {}", style(stats.records).green());
    println!("  Dimension:       {}", style(stats.dimension).cyan());
    println!("  Model:           {}", style(&stats.model).cyan());
    println!("  Normalized:      {}", stats.normalized);
    println!(
        "  Size:            {} KB",
        style(stats.file_size_bytes / 1024).yellow()
    );
    if let Some(created) = stats.created_at {
        println!(
            "  Created:         {}",
            style(created.format("%Y-%m-%d %H:%M:%S")).dim()
        );
    }

    Ok(())
}
