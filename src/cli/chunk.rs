use anyhow::{Context, Result};
use console::{style, Emoji};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::search::chunker::{write_jsonl, Chunker};

static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");

pub fn run_chunk(config: &Config, document: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let document = document.unwrap_or(config.paths.document.as_path());
    let output = output.unwrap_or(config.paths.chunks.as_path());

    let text = fs::read_to_string(document)
        .with_context(|| format!("cannot read document {}", document.display()))?;

    let chunker = Chunker::from_config(&config.chunking)?;
    let chunks = chunker.chunk_all(&text);
    write_jsonl(&chunks, output)?;

    println!(
        "{}Wrote {} chunks to {}",
        SUCCESS,
        style(chunks.len()).cyan(),
        style(output.display()).green()
    );

    Ok(())
}
