//! Text embedding for the semantic index.
//!
//! Production embeddings come from an OpenAI-compatible `/embeddings` endpoint.
//! Vectors are persisted in `document_chunks.embedding`, so the model and
//! dimensions must stay fixed for the lifetime of a database.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::IndexError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;

    fn dimensions(&self) -> usize;
}

/// Embeds a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, IndexError> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .pop()
        .ok_or_else(|| IndexError::Embedding("provider returned no vectors".to_string()))
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub path: String,
    pub model: String,
    pub api_key: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

/// Calls an OpenAI-compatible embeddings API.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.timeout)
                .build()
                .expect("Failed to build HTTP client"),
            url: format!(
                "{}{}",
                config.api_base.trim_end_matches('/'),
                config.path
            ),
            config,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.config.model,
            "input": texts,
            "dimensions": self.config.dimensions,
        });
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IndexError::Embedding(e.to_string()))?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        let vectors = parse_embedding_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.config.dimensions) {
            return Err(IndexError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.config.dimensions,
                bad.len()
            )));
        }

        debug!("Embedded {} texts with {}", texts.len(), self.config.model);
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

/// Reads `data[].embedding`, ordered by `data[].index` when present.
fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>, IndexError> {
    let data = json
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| IndexError::Embedding("response is missing the data array".to_string()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(position);
        let values = item
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| IndexError::Embedding("item is missing its embedding".to_string()))?;
        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|n| n as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| IndexError::Embedding("embedding values must be numeric".to_string()))?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Cosine distance on the [0, 2] scale: 0 identical, 1 unrelated, 2 opposite.
///
/// Zero-magnitude or mismatched vectors are treated as unrelated.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }

    (1.0 - dot / (mag_a * mag_b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HashingEmbedder;

    #[test]
    fn test_parses_embeddings_in_index_order() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [2.0, 3.0] },
                { "index": 0, "embedding": [0.5, 1.5] }
            ]
        });
        let parsed = parse_embedding_response(&json).unwrap();
        assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
    }

    #[test]
    fn test_malformed_responses_are_embedding_errors() {
        assert!(matches!(
            parse_embedding_response(&json!({ "object": "list" })),
            Err(IndexError::Embedding(_))
        ));
        assert!(matches!(
            parse_embedding_response(&json!({ "data": [{ "embedding": ["x"] }] })),
            Err(IndexError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_an_embedding_error() {
        let embedder = HttpEmbedder::new(EmbeddingConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            path: "/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: "test".to_string(),
            dimensions: 8,
            timeout: Duration::from_millis(500),
        });
        let result = embed_one(&embedder, "rust").await;
        assert!(matches!(result, Err(IndexError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_embed_one_returns_single_vector() {
        let vector = embed_one(&HashingEmbedder::new(16), "Rust engineer").await.unwrap();
        assert_eq!(vector.len(), 16);
    }

    #[test]
    fn test_cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
