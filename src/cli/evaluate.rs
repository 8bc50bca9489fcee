use anyhow::Result;
use console::{style, Emoji};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::search::Passage;

static SCORE: Emoji<'_, '_> = Emoji("🎯 ", "");

#[derive(Debug, Serialize)]
struct EvaluationReport<'a> {
    question: &'a str,
    answer: &'a str,
    ideal: &'a str,
    similarity: f32,
    passages: Vec<Passage>,
}

/// Retrieve context for `question` and score `answer` against `ideal`.
///
/// Producing the answer is left to an external generator; the caller
/// supplies it here.
pub async fn run_evaluate(
    config: &Config,
    question: &str,
    answer: &str,
    ideal: &str,
    json: bool,
    store: Option<&Path>,
) -> Result<()> {
    let retriever = super::open_retriever(config, store)?;
    let passages = retriever
        .retrieve(question, config.search.evaluation_top_k)
        .await?;
    let similarity = retriever.similarity(answer, ideal).await?;

    let report = EvaluationReport {
        question,
        answer,
        ideal,
        similarity,
        passages,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}Similarity: {}\n", SCORE, style(format!("{:.4}", report.similarity)).cyan().bold());
    println!(
        "  Context passages: {}",
        style(report.passages.len()).green()
    );
    for passage in &report.passages {
        println!(
            "  {} {}",
            style(format!("{:.3}", passage.score)).dim(),
            passage.heading
        );
    }

    Ok(())
}
