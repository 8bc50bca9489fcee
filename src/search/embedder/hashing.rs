//! Feature-hashing embedder.
//!
//! Lowercased word tokens and adjacent word pairs are hashed with SHA-256
//! into `dimensions` signed buckets. No model files, fully deterministic,
//! and texts sharing vocabulary land close together under cosine.

use async_trait::async_trait;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use super::{checked_text, Embedder};
use crate::error::{Error, Result};

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::ModelUnavailable(
                "hash embedder needs a positive dimension".into(),
            ));
        }
        Ok(Self {
            dimensions,
            model_id: format!("hash-v1-{}", dimensions),
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let text = checked_text(text)?;
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens.iter().copied() {
            self.add_feature(&mut vector, &["w:", token], UNIGRAM_WEIGHT);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &["b:", pair[0], " ", pair[1]], BIGRAM_WEIGHT);
        }

        Ok(vector)
    }

    fn add_feature(&self, vector: &mut [f32], parts: &[&str], weight: f32) {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();

        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]) % self.dimensions as u64;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket as usize] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.par_iter().map(|t| self.encode(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::store::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed("Routing audio to return tracks").await.unwrap();
        let b = embedder.embed("Routing audio to return tracks").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashEmbedder::new(128).unwrap();
        let texts = vec![
            "Warp markers".to_string(),
            "Session view scenes".to_string(),
            "Freeze and flatten tracks".to_string(),
        ];

        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(batch.iter()) {
            assert_eq!(&embedder.embed(text).await.unwrap(), vector);
        }

        let single = embedder.embed_batch(&texts[..1]).await.unwrap();
        assert_eq!(single, vec![embedder.embed(&texts[0]).await.unwrap()]);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let embedder = HashEmbedder::new(16).unwrap();
        assert!(matches!(
            embedder.embed("   ").await,
            Err(Error::InvalidInput(_))
        ));
        let texts = vec!["fine".to_string(), "".to_string()];
        assert!(embedder.embed_batch(&texts).await.is_err());
    }

    #[tokio::test]
    async fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed("Follow Actions!").await.unwrap();
        let b = embedder.embed("follow actions").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(1024).unwrap();
        let query = embedder.embed("how do sends and returns work").await.unwrap();
        let related = embedder
            .embed("Sends and returns route signal to return tracks")
            .await
            .unwrap();
        let unrelated = embedder
            .embed("Warp markers stretch audio clips in time")
            .await
            .unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_symbols_only_gives_zero_vector() {
        let embedder = HashEmbedder::new(8).unwrap();
        let v = embedder.embed("!!! ---").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            HashEmbedder::new(0),
            Err(Error::ModelUnavailable(_))
        ));
    }
}
