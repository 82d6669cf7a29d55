use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use opscout_core::config::EmbeddingConfig;
use opscout_core::error::{OpscoutError, Result};

/// Trait for embedding providers (OpenAI-compatible APIs).
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts into vectors, one per input in order.
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;
    /// Number of dimensions in the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// HTTP-based embedding provider compatible with OpenAI, DashScope, Ollama, etc.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dims: config.dims,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let texts = texts.to_vec();
        Box::pin(async move {
            let url = format!("{}/embeddings", self.base_url);
            let expected = texts.len();

            let mut req = self.client.post(&url).json(&EmbeddingRequest {
                model: self.model.clone(),
                input: texts,
            });

            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| OpscoutError::Embedding(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(OpscoutError::Embedding(format!("HTTP {}: {}", status, body)));
            }

            let mut body: EmbeddingResponse = resp
                .json()
                .await
                .map_err(|e| OpscoutError::Embedding(format!("bad response: {}", e)))?;

            if body.data.len() != expected {
                return Err(OpscoutError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    expected,
                    body.data.len()
                )));
            }

            body.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
            Ok(body.data.into_iter().map(|d| d.embedding).collect())
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let sim = cosine_similarity(&[0.3, 0.4], &[0.3, 0.4]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_mismatched_or_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_provider_trims_base_url() {
        let provider = HttpEmbeddingProvider::new(&EmbeddingConfig {
            base_url: "https://api.openai.com/v1/".into(),
            api_key: None,
            model: "text-embedding-3-small".into(),
            dims: 1536,
        });
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.dimensions(), 1536);
    }
}
