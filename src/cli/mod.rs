mod args;
mod chunk;
mod evaluate;
mod index;
mod search;

pub use args::{Args, Command};
pub use chunk::run_chunk;
pub use evaluate::run_evaluate;
pub use index::{run_build, run_info};
pub use search::run_search;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::search::{create_embedder, ParquetStore, Retriever};

fn store_path(config: &Config, store: Option<&Path>) -> PathBuf {
    store
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.paths.store.clone())
}

/// Load the store and pair it with the configured embedder.
fn open_retriever(config: &Config, store: Option<&Path>) -> Result<Retriever> {
    let path = store_path(config, store);
    if !path.exists() {
        anyhow::bail!(
            "No vector store found at {}. Run `docrag build` first.",
            path.display()
        );
    }

    let collection = ParquetStore::new(&path).load()?;
    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::new(embedder, Arc::new(collection))
        .with_context(|| format!("store {} cannot be queried", path.display()))?;
    Ok(retriever)
}

/// Collapse to one line and cut at `max` characters.
fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}
