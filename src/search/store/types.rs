use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A headed segment of the source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// 0-based position in document order
    pub id: u64,
    /// Heading the text was found under; empty for preamble text
    pub heading: String,
    /// Section number of a numbered heading, e.g. `17.2`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Number of components in `section`; 0 for unnumbered headings
    #[serde(default)]
    pub depth: u8,
    /// Headings of the enclosing numbered sections, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    /// Whitespace-normalized body text, never empty
    pub text: String,
}

/// A chunk together with its embedding, the persisted unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }
}

/// File-level facts recorded alongside the rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreMetadata {
    /// Width `D` of every vector in the store
    pub dimension: usize,
    /// Identifier of the embedding model that produced the vectors
    pub model: String,
    /// Whether vectors were L2-normalized before writing
    pub normalized: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl StoreMetadata {
    pub fn new(dimension: usize, model: impl Into<String>, normalized: bool) -> Self {
        Self {
            dimension,
            model: model.into(),
            normalized,
            created_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub records: usize,
    pub dimension: usize,
    pub model: String,
    pub normalized: bool,
    pub file_size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
}
