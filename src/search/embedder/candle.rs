//! BERT sentence-transformer embedder using Candle.
//!
//! Weights are read from a local directory holding `config.json`,
//! `tokenizer.json` and `model.safetensors`; nothing is downloaded.
//! Output is the attention-masked mean of the last hidden layer.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{checked_text, Embedder};
use crate::error::{Error, Result};

/// Texts of equal token length run through the model together, at most this many at once.
const MAX_BATCH: usize = 32;

/// Fields of `config.json` needed beyond what `BertModel` consumes.
#[derive(Deserialize)]
struct ModelShape {
    hidden_size: usize,
    #[serde(default = "default_max_position_embeddings")]
    max_position_embeddings: usize,
}

fn default_max_position_embeddings() -> usize {
    512
}

pub struct CandleEmbedder {
    model_id: String,
    device: Device,
    model: BertModel,
    tokenizer: Tokenizer,
    dimension: usize,
    max_tokens: usize,
}

fn unavailable(path: &Path, what: impl std::fmt::Display) -> Error {
    Error::ModelUnavailable(format!("{}: {}", path.display(), what))
}

fn inference(e: candle_core::Error) -> Error {
    Error::Embedding(e.to_string())
}

fn required_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(unavailable(&path, "file not found"));
    }
    Ok(path)
}

impl CandleEmbedder {
    /// Load tokenizer, config and weights from `model_dir` onto the CPU.
    pub fn load(model_id: &str, model_dir: &Path) -> Result<Self> {
        let config_path = required_file(model_dir, "config.json")?;
        let tokenizer_path = required_file(model_dir, "tokenizer.json")?;
        let weights_path = required_file(model_dir, "model.safetensors")?;

        info!("Loading embedding model {} from {}", model_id, model_dir.display());

        let raw = fs::read_to_string(&config_path).map_err(|e| unavailable(&config_path, e))?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| unavailable(&config_path, e))?;
        let shape: ModelShape =
            serde_json::from_str(&raw).map_err(|e| unavailable(&config_path, e))?;

        let tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|e| unavailable(&tokenizer_path, e))?;

        let device = Device::Cpu;
        // SAFETY: the weights file is memory-mapped read-only and is not
        // modified while the embedder is alive.
        #[allow(unsafe_code)]
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)
                .map_err(|e| unavailable(&weights_path, e))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| unavailable(&weights_path, e))?;

        debug!(
            "Model ready: dimension {}, max tokens {}",
            shape.hidden_size, shape.max_position_embeddings
        );

        Ok(Self {
            model_id: model_id.to_string(),
            device,
            model,
            tokenizer,
            dimension: shape.hidden_size,
            max_tokens: shape.max_position_embeddings,
        })
    }

    fn token_ids(&self, text: &str) -> Result<Vec<u32>> {
        let text = checked_text(text)?;
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;
        let mut ids = encoding.get_ids().to_vec();
        ids.truncate(self.max_tokens);
        Ok(ids)
    }

    /// Run one batch whose rows all have the same token count, so no padding
    /// is involved and every row sees exactly the computation a single call would.
    fn forward(&self, rows: &[&Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let seq_len = rows.first().map(|r| r.len()).unwrap_or(0);
        let flat: Vec<u32> = rows.iter().flat_map(|r| r.iter().copied()).collect();

        let input_ids =
            Tensor::from_vec(flat, (rows.len(), seq_len), &self.device).map_err(inference)?;
        let token_type_ids = input_ids.zeros_like().map_err(inference)?;
        let attention_mask = input_ids.ones_like().map_err(inference)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(inference)?;

        hidden
            .mean(1)
            .map_err(inference)?
            .to_dtype(DType::F32)
            .map_err(inference)?
            .to_vec2::<f32>()
            .map_err(inference)
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let ids = self.token_ids(text)?;
        self.forward(&[&ids])?
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no rows".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encoded = texts
            .iter()
            .map(|t| self.token_ids(t))
            .collect::<Result<Vec<_>>>()?;

        let mut by_length: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, ids) in encoded.iter().enumerate() {
            by_length.entry(ids.len()).or_default().push(index);
        }

        let mut out: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for indices in by_length.values() {
            for group in indices.chunks(MAX_BATCH) {
                let rows: Vec<&Vec<u32>> = group.iter().map(|&i| &encoded[i]).collect();
                for (&index, vector) in group.iter().zip(self.forward(&rows)?) {
                    out[index] = vector;
                }
            }
        }

        Ok(out)
    }
}
