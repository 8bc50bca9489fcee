use anyhow::Result;
use console::{style, Emoji};
use std::path::Path;

use crate::config::Config;

static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "");
static PAGE: Emoji<'_, '_> = Emoji("📄 ", "");

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    json: bool,
    store: Option<&Path>,
) -> Result<()> {
    let retriever = super::open_retriever(config, store)?;
    let k = top_k.unwrap_or(config.search.top_k);
    let passages = retriever.retrieve(query, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&passages)?);
        return Ok(());
    }

    if passages.is_empty() {
        println!("No results found for: {}", style(query).italic());
        return Ok(());
    }

    println!(
        "\n{}Found {} results for: {}\n",
        SEARCH,
        style(passages.len()).cyan(),
        style(query).yellow().bold()
    );

    for (i, passage) in passages.iter().enumerate() {
        let heading = if passage.heading.is_empty() {
            "(preamble)"
        } else {
            passage.heading.as_str()
        };
        println!(
            "{} {}. {} {}",
            PAGE,
            style(i + 1).dim(),
            style(heading).green(),
            style(format!("#{}", passage.id)).dim()
        );
        println!(
            "   Score: {}",
            style(format!("{:.3}", passage.score)).cyan()
        );
        println!("   {}", style(super::preview(&passage.text, 200)).dim());
        println!();
    }

    Ok(())
}
