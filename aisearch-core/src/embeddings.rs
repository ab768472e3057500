//! Pluggable embedding providers.
//!
//! Provides a trait-based abstraction over embedding models, with a local
//! hashed term-frequency embedder (always available, used by tests and offline
//! runs) and the OpenAI embeddings API.

use crate::brain::TokenCounter;
use crate::callbacks::TokenCountingHandler;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Local hashed term-frequency embedder. Deterministic and offline.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding, shared by the async trait impl.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            vector[djb2(term) % self.dimensions] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// OpenAI API embedder (text-embedding-ada-002 by default).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-ada-002".into());
        let dims = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dims,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".into())
                .trim_end_matches('/')
                .to_string(),
            batch_size: 10,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiRequest {
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let json: serde_json::Value =
            resp.json()
                .await
                .map_err(|e| EmbeddingError::ResponseParse {
                    message: e.to_string(),
                })?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| EmbeddingError::ResponseParse {
                message: "missing 'data' array".into(),
            })?;

        // The API may reorder; `index` is authoritative.
        let mut indexed: Vec<(usize, Vec<f32>)> = data
            .iter()
            .enumerate()
            .map(|(pos, item)| {
                let idx = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
                let vector = item["embedding"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .unwrap_or_default();
                (idx, vector)
            })
            .collect();
        indexed.sort_by_key(|(idx, _)| *idx);

        if indexed.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: inputs.len(),
                received: indexed.len(),
            });
        }
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            sent: 1,
            received: 0,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!(batch = chunk.len(), model = %self.model, "Embedding batch");
            out.extend(self.request(chunk).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Wraps another embedder and reports token usage to the shared counter.
pub struct CountingEmbedder {
    inner: Arc<dyn Embedder>,
    counter: TokenCounter,
    callbacks: Arc<TokenCountingHandler>,
}

impl CountingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, callbacks: Arc<TokenCountingHandler>) -> Self {
        Self {
            inner,
            counter: TokenCounter::for_model("text-embedding-ada-002"),
            callbacks,
        }
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.inner.embed(text).await?;
        self.callbacks.on_embedding(self.counter.count(text));
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self.inner.embed_batch(texts).await?;
        let tokens: usize = texts.iter().map(|t| self.counter.count(t)).sum();
        self.callbacks.on_embedding(tokens);
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

/// Factory function to create an embedder based on configuration.
///
/// The OpenAI embedder needs an API key; without one the local embedder is
/// used instead.
pub fn create_embedder(config: &EmbeddingConfig, api_key: Option<String>) -> Arc<dyn Embedder> {
    let local_dims = if config.dimensions > 0 {
        config.dimensions
    } else {
        256
    };
    match config.provider.as_str() {
        "openai" => match api_key.filter(|k| !k.is_empty()) {
            Some(key) => Arc::new(
                OpenAiEmbedder::new(key, config.model.clone(), config.base_url.clone())
                    .with_batch_size(config.batch_size),
            ),
            None => {
                warn!("No API key for OpenAI embeddings, falling back to local embedder");
                Arc::new(LocalEmbedder::new(local_dims))
            }
        },
        "local" => Arc::new(LocalEmbedder::new(local_dims)),
        other => {
            warn!(provider = other, "Unknown embedding provider, using local");
            Arc::new(LocalEmbedder::new(local_dims))
        }
    }
}

/// Cosine similarity of two vectors; 0.0 when either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_embedder_normalized() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder.embed("test input text for normalization").await.unwrap();
        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "got norm={}", norm);
    }

    #[tokio::test]
    async fn test_local_embedder_empty_text() {
        let embedder = LocalEmbedder::new(64);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_local_embedder_deterministic_and_discriminative() {
        let embedder = LocalEmbedder::new(128);
        let a1 = embedder.embed("same text").await.unwrap();
        let a2 = embedder.embed("same text").await.unwrap();
        let b = embedder.embed("goodbye universe").await.unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[tokio::test]
    async fn test_embed_batch_keeps_order() {
        let embedder = LocalEmbedder::new(64);
        let texts = vec!["hello".to_string(), "world".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed("world").await.unwrap());
    }

    #[tokio::test]
    async fn test_counting_embedder_reports_tokens() {
        let handler = Arc::new(TokenCountingHandler::new());
        let embedder = CountingEmbedder::new(Arc::new(LocalEmbedder::new(32)), handler.clone());
        embedder
            .embed_batch(&["one two three".to_string(), "four".to_string()])
            .await
            .unwrap();
        embedder.embed("five").await.unwrap();
        let totals = handler.totals();
        assert_eq!(totals.embedding_calls, 2);
        assert!(totals.embedding_tokens >= 3);
    }

    #[test]
    fn test_create_embedder_without_key_falls_back() {
        let embedder = create_embedder(&EmbeddingConfig::default(), None);
        assert_eq!(embedder.provider_name(), "local");
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn test_create_embedder_openai_with_key() {
        let embedder = create_embedder(&EmbeddingConfig::default(), Some("sk-test".into()));
        assert_eq!(embedder.provider_name(), "openai");
        assert_eq!(embedder.dimensions(), 1536);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
