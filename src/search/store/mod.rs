mod columnar;
mod types;

pub use columnar::ParquetStore;
pub use types::{Chunk, EmbeddingRecord, SearchResult, StoreMetadata, StoreStats};

use rayon::prelude::*;
use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Collections at least this large are scored on the rayon pool.
const PARALLEL_SCORING_MIN_ROWS: usize = 2048;

/// The loaded store: immutable, indexable by chunk id.
///
/// Vectors live in one row-major `len x dimension` matrix with their norms
/// precomputed, so a query is a single pass over contiguous memory.
#[derive(Debug, Clone)]
pub struct Collection {
    chunks: Vec<Chunk>,
    matrix: Vec<f32>,
    norms: Vec<f32>,
    metadata: StoreMetadata,
}

impl Collection {
    /// Build a collection from records already in id order.
    ///
    /// Every vector must have exactly `metadata.dimension` finite values and
    /// every chunk id must equal its position.
    pub fn from_records(records: Vec<EmbeddingRecord>, metadata: StoreMetadata) -> Result<Self> {
        let dim = metadata.dimension;
        if dim == 0 && !records.is_empty() {
            return Err(Error::InvalidArgument("dimension must be positive".into()));
        }

        let mut chunks = Vec::with_capacity(records.len());
        let mut matrix = Vec::with_capacity(records.len() * dim);
        let mut norms = Vec::with_capacity(records.len());

        for (position, record) in records.into_iter().enumerate() {
            if record.vector.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: record.vector.len(),
                });
            }
            if record.chunk.id != position as u64 {
                return Err(Error::InvalidArgument(format!(
                    "chunk id {} at position {}",
                    record.chunk.id, position
                )));
            }
            if record.vector.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidArgument(format!(
                    "chunk {} has a non-finite vector value",
                    position
                )));
            }
            norms.push(l2_norm(&record.vector));
            matrix.extend_from_slice(&record.vector);
            chunks.push(record.chunk);
        }

        Ok(Self {
            chunks,
            matrix,
            norms,
            metadata,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.metadata.dimension
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        if id >= self.len() {
            return None;
        }
        let dim = self.dimension();
        Some(&self.matrix[id * dim..(id + 1) * dim])
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Owned copies of every record, in id order.
    pub fn to_records(&self) -> Vec<EmbeddingRecord> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(id, chunk)| {
                let vector = self.vector(id).map(<[f32]>::to_vec).unwrap_or_default();
                EmbeddingRecord::new(chunk.clone(), vector)
            })
            .collect()
    }

    /// Exact top-`k` by cosine similarity; ties go to the lower chunk id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be a positive integer".into()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidArgument(
                "query vector has a non-finite value".into(),
            ));
        }

        let scores = self.score_all(query);

        let by_rank = |a: &usize, b: &usize| -> Ordering {
            scores[*b].total_cmp(&scores[*a]).then_with(|| a.cmp(b))
        };

        let mut order: Vec<usize> = (0..scores.len()).collect();
        if k < order.len() {
            order.select_nth_unstable_by(k - 1, by_rank);
            order.truncate(k);
        }
        order.sort_unstable_by(by_rank);

        Ok(order
            .into_iter()
            .map(|id| SearchResult::new(self.chunks[id].clone(), scores[id]))
            .collect())
    }

    fn score_all(&self, query: &[f32]) -> Vec<f32> {
        let dim = self.dimension();
        let query_norm = l2_norm(query);
        let score = |(row, norm): (&[f32], &f32)| cosine_with_norms(query, query_norm, row, *norm);

        if self.len() >= PARALLEL_SCORING_MIN_ROWS {
            self.matrix
                .par_chunks_exact(dim)
                .zip(self.norms.par_iter())
                .map(score)
                .collect()
        } else {
            self.matrix
                .chunks_exact(dim)
                .zip(self.norms.iter())
                .map(score)
                .collect()
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            records: self.len(),
            dimension: self.dimension(),
            model: self.metadata.model.clone(),
            normalized: self.metadata.normalized,
            file_size_bytes: 0,
            created_at: self.metadata.created_at,
        }
    }
}

/// `search(query_vector, collection, k)` as a free function.
pub fn search(query: &[f32], collection: &Collection, k: usize) -> Result<Vec<SearchResult>> {
    collection.search(query, k)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt() as f32
}

/// Accumulates in `f64` so large finite components cannot overflow.
#[inline]
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Zero magnitude on either side scores 0.0, and so does any
/// non-finite result. Never NaN.
#[inline]
fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    let denom = f64::from(norm_a) * f64::from(norm_b);
    if denom == 0.0 {
        return 0.0;
    }
    let score = (dot(a, b) / denom) as f32;
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
