use futures::{stream, StreamExt, TryStreamExt};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

use super::chunker::Chunker;
use super::embedder::{normalize, Embedder};
use super::store::{EmbeddingRecord, ParquetStore, StoreMetadata};

/// Offline build: document text in, persisted store out.
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    batch_size: usize,
    concurrency: usize,
    normalize: bool,
}

#[derive(Debug, Clone)]
pub struct IndexResult {
    pub chunks: usize,
    pub dimension: usize,
    /// The store already existed and `force` was not set
    pub skipped: bool,
    pub elapsed: Duration,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker, config: &EmbeddingConfig) -> Self {
        Self {
            embedder,
            chunker,
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            normalize: config.normalize,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Chunk `text` and embed every chunk, keeping document order.
    pub async fn build_records(&self, text: &str) -> Result<Vec<EmbeddingRecord>> {
        let chunks = self.chunker.chunk_all(text);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let total_batches = texts.len().div_ceil(self.batch_size);
        info!(
            "Embedding {} chunks in {} batches of up to {}",
            chunks.len(),
            total_batches,
            self.batch_size
        );

        let embedder = &self.embedder;
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.batch_size).enumerate())
            .map(|(index, batch)| async move {
                let vectors = embedder.embed_batch(batch).await?;
                if vectors.len() != batch.len() {
                    return Err(Error::Embedding(format!(
                        "batch {} returned {} vectors for {} texts",
                        index,
                        vectors.len(),
                        batch.len()
                    )));
                }
                debug!("Embedded batch {}/{}", index + 1, total_batches);
                Ok(vectors)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let dimension = self.embedder.dimensions();
        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, mut vector) in chunks.into_iter().zip(batches.into_iter().flatten()) {
            if vector.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if self.normalize {
                normalize(&mut vector);
            }
            records.push(EmbeddingRecord::new(chunk, vector));
        }

        Ok(records)
    }

    /// Build the store at `store_path` from the document at `document_path`.
    ///
    /// An existing store is left alone unless `force` is set.
    pub async fn build(
        &self,
        document_path: &Path,
        store_path: &Path,
        force: bool,
    ) -> Result<IndexResult> {
        let started = Instant::now();
        let store = ParquetStore::new(store_path);
        let dimension = self.embedder.dimensions();

        if store.exists() && !force {
            info!(
                "Store {} already exists, skipping build",
                store_path.display()
            );
            return Ok(IndexResult {
                chunks: 0,
                dimension,
                skipped: true,
                elapsed: started.elapsed(),
            });
        }

        info!("Reading {}", document_path.display());
        let text = fs::read_to_string(document_path)?;

        let records = self.build_records(&text).await?;
        let metadata = StoreMetadata::new(dimension, self.embedder.model_id(), self.normalize);
        store.write(&records, &metadata)?;

        let elapsed = started.elapsed();
        info!(
            "Indexed {} chunks ({} dimensions) in {:.2?}",
            records.len(),
            dimension,
            elapsed
        );

        Ok(IndexResult {
            chunks: records.len(),
            dimension,
            skipped: false,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedder::HashEmbedder;
    use crate::search::store::l2_norm;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const MANUAL: &str = "\
17. Routing
Audio can be routed between tracks.

17.1 Sends and Returns
Sends route signal to return tracks.
Return tracks host shared effects.

17.2 Sidechains
A compressor can listen to another track.
";

    fn config(batch_size: usize, normalize: bool) -> EmbeddingConfig {
        EmbeddingConfig {
            dimensions: 64,
            batch_size,
            concurrency: 3,
            normalize,
            ..EmbeddingConfig::default()
        }
    }

    fn indexer(batch_size: usize, normalize: bool) -> Indexer {
        Indexer::new(
            Arc::new(HashEmbedder::new(64).unwrap()),
            Chunker::default(),
            &config(batch_size, normalize),
        )
    }

    /// Counts batches and echoes the text length into the first slot.
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            "counting"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn test_build_records_keeps_order() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let indexer = Indexer::new(embedder.clone(), Chunker::default(), &config(1, false));

        let records = indexer.build_records(MANUAL).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        for (position, record) in records.iter().enumerate() {
            assert_eq!(record.chunk.id, position as u64);
            assert_eq!(record.vector[0], record.chunk.text.len() as f32);
        }
        assert_eq!(records[1].chunk.heading, "Sends and Returns");
    }

    #[tokio::test]
    async fn test_batching_does_not_change_vectors() {
        let one = indexer(1, false).build_records(MANUAL).await.unwrap();
        let many = indexer(100, false).build_records(MANUAL).await.unwrap();
        assert_eq!(one, many);
    }

    #[tokio::test]
    async fn test_normalized_records() {
        let records = indexer(2, true).build_records(MANUAL).await.unwrap();
        for record in &records {
            assert!((l2_norm(&record.vector) - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_empty_document() {
        assert!(indexer(4, true).build_records("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_writes_store() {
        let dir = TempDir::new().unwrap();
        let document = dir.path().join("manual.txt");
        let store_path = dir.path().join("index").join("embeddings.parquet");
        fs::write(&document, MANUAL).unwrap();

        let result = indexer(2, true)
            .build(&document, &store_path, false)
            .await
            .unwrap();
        assert!(!result.skipped);
        assert_eq!(result.chunks, 3);
        assert_eq!(result.dimension, 64);

        let collection = ParquetStore::new(&store_path).load().unwrap();
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.metadata().model, "hash-v1-64");
        assert!(collection.metadata().normalized);
    }

    #[tokio::test]
    async fn test_existing_store_skipped_unless_forced() {
        let dir = TempDir::new().unwrap();
        let document = dir.path().join("manual.txt");
        let store_path = dir.path().join("embeddings.parquet");
        fs::write(&document, MANUAL).unwrap();

        let indexer = indexer(10, true);
        indexer.build(&document, &store_path, false).await.unwrap();

        fs::write(&document, "1. Only\nOne section now.\n").unwrap();
        let skipped = indexer.build(&document, &store_path, false).await.unwrap();
        assert!(skipped.skipped);
        assert_eq!(ParquetStore::new(&store_path).load().unwrap().len(), 3);

        let rebuilt = indexer.build(&document, &store_path, true).await.unwrap();
        assert!(!rebuilt.skipped);
        assert_eq!(rebuilt.chunks, 1);
        assert_eq!(ParquetStore::new(&store_path).load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let dir = TempDir::new().unwrap();
        let result = indexer(10, true)
            .build(
                &dir.path().join("nope.txt"),
                &dir.path().join("e.parquet"),
                false,
            )
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
