#[cfg(feature = "candle")]
mod candle;
mod hashing;

#[cfg(feature = "candle")]
pub use self::candle::CandleEmbedder;
pub use hashing::HashEmbedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};

use super::store::l2_norm;

/// Maps text to a fixed-width vector.
///
/// Implementations are deterministic for a given model, never touch the
/// network, and return raw (unnormalized) vectors. `embed_batch` must
/// return exactly what repeated `embed` calls would.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded in the store and checked at query time.
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the configured backend. Model weights are loaded here, once.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hash => Ok(Arc::new(HashEmbedder::new(config.dimensions)?)),
        #[cfg(feature = "candle")]
        EmbeddingProvider::Candle => Ok(Arc::new(CandleEmbedder::load(
            &config.model,
            &config.model_dir,
        )?)),
        #[cfg(not(feature = "candle"))]
        EmbeddingProvider::Candle => Err(Error::ModelUnavailable(
            "docrag was built without the `candle` feature".to_string(),
        )),
    }
}

/// Reject text that is empty once trimmed.
pub(crate) fn checked_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("cannot embed empty text".into()));
    }
    Ok(trimmed)
}

/// Scale to unit length in place. Zero vectors are left as they are.
pub fn normalize(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_checked_text() {
        assert_eq!(checked_text("  hi ").unwrap(), "hi");
        assert!(matches!(checked_text(" \n\t "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_create_hash_embedder() {
        let config = EmbeddingConfig {
            dimensions: 32,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimensions(), 32);
        assert_eq!(embedder.model_id(), "hash-v1-32");
    }

    #[cfg(not(feature = "candle"))]
    #[test]
    fn test_candle_unavailable_without_feature() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Candle,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[cfg(feature = "candle")]
    #[test]
    fn test_candle_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Candle,
            model_dir: dir.path().join("nothing-here"),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(Error::ModelUnavailable(_))
        ));
    }
}
