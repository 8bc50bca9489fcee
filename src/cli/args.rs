use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(author, version, about = "Offline retrieval over a structured text manual", long_about = None)]
pub struct Args {
    /// Path to config file (default: ./docrag.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a document into headed chunks and write them as JSON lines
    Chunk {
        /// Document to chunk (default: paths.document)
        document: Option<PathBuf>,

        /// Output file (default: paths.chunks)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Chunk, embed and persist a document into the vector store
    Build {
        /// Document to index (default: paths.document)
        document: Option<PathBuf>,

        /// Store file (default: paths.store)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Rebuild even if the store already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Retrieve the passages closest to a query
    Search {
        /// Query text
        query: String,

        /// Number of passages (default: search.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Store file (default: paths.store)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Show vector store statistics
    Info {
        /// Store file (default: paths.store)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Score a candidate answer against an ideal answer
    Evaluate {
        /// Question used to retrieve supporting passages
        question: String,

        /// Candidate answer to score
        #[arg(long)]
        answer: String,

        /// Reference answer
        #[arg(long)]
        ideal: String,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,

        /// Store file (default: paths.store)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}
