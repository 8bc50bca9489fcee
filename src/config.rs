//! Configuration handling for docrag.
//!
//! Loaded from a TOML file. Every field carries a serde default, so a
//! partial file (or no file at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "docrag.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Plain-text document to chunk and index
    #[serde(default = "default_document")]
    pub document: PathBuf,

    /// JSONL dump written by `docrag chunk`
    #[serde(default = "default_chunks")]
    pub chunks: PathBuf,

    /// Parquet store file
    #[serde(default = "default_store")]
    pub store: PathBuf,
}

fn default_document() -> PathBuf {
    PathBuf::from("data/full_manual_text.txt")
}

fn default_chunks() -> PathBuf {
    PathBuf::from("data/chunks.jsonl")
}

fn default_store() -> PathBuf {
    PathBuf::from("index/embeddings.parquet")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            document: default_document(),
            chunks: default_chunks(),
            store: default_store(),
        }
    }
}

/// Which lines of the document open a new chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeadingStyle {
    /// `17.`, `17. Routing`, `17.2.1 Sends`
    Numbered,
    /// `INTRO`, `GETTING STARTED`
    Caps,
    /// Numbered first, then caps
    #[default]
    Auto,
    /// User-supplied regex in `chunking.pattern`
    Pattern,
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub heading_style: HeadingStyle,

    /// Regex for `heading_style = "pattern"`
    #[serde(default)]
    pub pattern: Option<String>,

    /// Lines longer than this are never treated as headings
    #[serde(default = "default_max_heading_chars")]
    pub max_heading_chars: usize,
}

fn default_max_heading_chars() -> usize {
    80
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            heading_style: HeadingStyle::default(),
            pattern: None,
            max_heading_chars: default_max_heading_chars(),
        }
    }
}

/// Embedding backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Built-in feature-hashing embedder, no model files
    #[default]
    Hash,
    /// Local BERT sentence-transformer (requires the `candle` feature)
    Candle,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model identifier recorded in the store
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory holding `config.json`, `tokenizer.json`, `model.safetensors`
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Output width of the hash embedder
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Texts per `embed_batch` call during a build
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches embedded concurrently during a build
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// L2-normalize stored and query vectors
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models/all-MiniLM-L6-v2")
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_normalize() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_model(),
            model_dir: default_model_dir(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            normalize: default_normalize(),
        }
    }
}

/// Query-time configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Passages retrieved by `docrag evaluate`
    #[serde(default = "default_evaluation_top_k")]
    pub evaluation_top_k: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_evaluation_top_k() -> usize {
    15
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            evaluation_top_k: default_evaluation_top_k(),
        }
    }
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file, else `./docrag.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let text = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be positive".into()));
        }
        if self.embedding.concurrency == 0 {
            return Err(Error::Config("embedding.concurrency must be positive".into()));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::Config("embedding.dimensions must be positive".into()));
        }
        if self.search.top_k == 0 || self.search.evaluation_top_k == 0 {
            return Err(Error::Config("search top_k values must be positive".into()));
        }
        if self.chunking.heading_style == HeadingStyle::Pattern {
            let pattern = self.chunking.pattern.as_deref().ok_or_else(|| {
                Error::Config("chunking.pattern is required for heading_style = \"pattern\"".into())
            })?;
            regex::Regex::new(pattern)
                .map_err(|e| Error::Config(format!("chunking.pattern: {}", e)))?;
        }
        Ok(())
    }
}
