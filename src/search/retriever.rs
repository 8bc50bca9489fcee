use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::embedder::{normalize, Embedder};
use super::store::{cosine_similarity, Collection, SearchResult};

/// A ranked chunk handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: u64,
    pub heading: String,
    pub text: String,
    pub score: f32,
}

impl From<SearchResult> for Passage {
    fn from(result: SearchResult) -> Self {
        Self {
            id: result.chunk.id,
            heading: result.chunk.heading,
            text: result.chunk.text,
            score: result.score,
        }
    }
}

/// Query-time pairing of an embedder with a loaded collection.
///
/// Both are shared read-only; one `Retriever` can serve concurrent queries.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    collection: Arc<Collection>,
}

impl Retriever {
    /// Fails when the embedder cannot produce vectors comparable to the
    /// stored ones (different width or different model).
    pub fn new(embedder: Arc<dyn Embedder>, collection: Arc<Collection>) -> Result<Self> {
        if collection.dimension() != 0 && embedder.dimensions() != collection.dimension() {
            return Err(Error::DimensionMismatch {
                expected: collection.dimension(),
                actual: embedder.dimensions(),
            });
        }

        let stored = collection.metadata().model.as_str();
        if stored.is_empty() {
            warn!("Store does not record its embedding model; skipping model check");
        } else if stored != embedder.model_id() {
            return Err(Error::ModelMismatch {
                store: stored.to_string(),
                embedder: embedder.model_id().to_string(),
            });
        }

        Ok(Self {
            embedder,
            collection,
        })
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Embed `query` and return the `k` closest passages, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".into()));
        }
        if k == 0 {
            return Err(Error::InvalidArgument("k must be a positive integer".into()));
        }

        let mut vector = self.embedder.embed(query).await?;
        if self.collection.metadata().normalized {
            normalize(&mut vector);
        }

        let results = self.collection.search(&vector, k)?;
        debug!("Query matched {} of {} chunks", results.len(), self.collection.len());

        Ok(results.into_iter().map(Passage::from).collect())
    }

    /// Cosine similarity between the embeddings of two texts.
    pub async fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        let texts = [a.to_string(), b.to_string()];
        let vectors = self.embedder.embed_batch(&texts).await?;
        match vectors.as_slice() {
            [first, second] => Ok(cosine_similarity(first, second)),
            _ => Err(Error::Embedding(format!(
                "expected 2 vectors, got {}",
                vectors.len()
            ))),
        }
    }
}
