//! docrag: offline retrieval over a structured text manual.
//!
//! A document is split into headed chunks, each chunk is embedded once and
//! persisted to a Parquet vector store, and queries are answered by exact
//! cosine ranking against the loaded store.

pub mod cli;
pub mod config;
pub mod error;
pub mod search;

pub use config::Config;
pub use error::{Error, Result};
pub use search::{
    create_embedder, Chunk, Chunker, Collection, Embedder, Indexer, ParquetStore, Passage,
    Retriever,
};
