use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docrag::cli::{self, Args, Command};
use docrag::config::{Config, LoggingConfig};

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    init_logging(&config.logging, args.verbose);

    match args.command {
        Command::Chunk { document, output } => {
            cli::run_chunk(&config, document.as_deref(), output.as_deref())?;
        }
        Command::Build {
            document,
            store,
            force,
        } => {
            cli::run_build(&config, document.as_deref(), store.as_deref(), force).await?;
        }
        Command::Search {
            query,
            top_k,
            json,
            store,
        } => {
            cli::run_search(&config, &query, top_k, json, store.as_deref()).await?;
        }
        Command::Info { store } => {
            cli::run_info(&config, store.as_deref())?;
        }
        Command::Evaluate {
            question,
            answer,
            ideal,
            json,
            store,
        } => {
            cli::run_evaluate(&config, &question, &answer, &ideal, json, store.as_deref()).await?;
        }
    }

    Ok(())
}
