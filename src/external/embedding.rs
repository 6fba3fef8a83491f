use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};

use crate::external::error::ExternalError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
}

impl EmbeddingConfig {
    /// Resolve the configured model name to a fastembed model and its dimension
    fn resolve(&self) -> Result<(EmbeddingModel, usize)> {
        let name = self.model.trim_start_matches("sentence-transformers/");
        match name {
            "all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
            "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => {
                Ok((EmbeddingModel::BGESmallENV15, 384))
            }
            other => Err(ExternalError::ConfigError(format!(
                "Unsupported embedding model: {}",
                other
            ))
            .into()),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// Seam for anything that can turn text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// Local sentence embedding engine backed by fastembed
pub struct EmbeddingEngine {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl EmbeddingEngine {
    /// Load the configured embedding model (downloaded on first use)
    pub async fn new(config: EmbeddingConfig) -> Result<Self> {
        let (model_kind, dimension) = config.resolve()?;

        // Model loading is CPU and IO heavy, keep it off the async runtime
        let model = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(InitOptions::new(model_kind).with_show_download_progress(false))
        })
        .await
        .map_err(|e| ExternalError::EmbeddingError(e.to_string()))?
        .map_err(|e| ExternalError::EmbeddingError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ExternalError::EmbeddingError("model returned no vectors".to_string()).into())
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(|e| e.into_inner());
            model.embed(texts, None)
        })
        .await
        .map_err(|e| ExternalError::EmbeddingError(e.to_string()))?
        .map_err(|e| ExternalError::EmbeddingError(e.to_string()))?;

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// First `max_chars` characters of `text`, never splitting a codepoint
pub fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Cosine similarity between two vectors; 0.0 when either vector is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        let config = EmbeddingConfig::default();
        let (_, dimension) = config.resolve().unwrap();
        assert_eq!(dimension, 384);

        // The sentence-transformers prefix from HuggingFace ids is accepted too
        let config = EmbeddingConfig {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
        };
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn test_resolve_unknown_model() {
        let config = EmbeddingConfig {
            model: "definitely-not-a-model".to_string(),
        };
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_head_respects_char_boundaries() {
        assert_eq!(head("hello", 10), "hello");
        assert_eq!(head("hello", 3), "hel");
        // 'é' is two bytes; a byte slice at 2 would panic
        assert_eq!(head("ééé", 2), "éé");
        assert_eq!(head("", 5), "");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        let c = vec![0.0, 1.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
    }
}
