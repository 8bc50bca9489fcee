//! Error types for docrag.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the retrieval core.
///
/// Every variant is returned synchronously to the immediate caller. Nothing
/// here is retried internally and no variant degrades into an empty result.
#[derive(Error, Debug)]
pub enum Error {
    /// The embedding backend could not be initialized
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Inference failed on a loaded model
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Text handed to an embedder was empty after trimming
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Caller-supplied argument rejected before any computation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted store could not be read back faithfully
    #[error("corrupt store {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// Vector width disagrees with the store or embedder width
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Store was built with a different embedding model
    #[error("model mismatch: store built with '{store}', embedder is '{embedder}'")]
    ModelMismatch { store: String, embedder: String },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Write-side store failure
    #[error("store error: {0}")]
    Store(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for docrag operations.
pub type Result<T> = std::result::Result<T, Error>;
