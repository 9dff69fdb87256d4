//! Embedding oracle: dense vectors from a remote embedding service, sparse
//! BM25-style vectors from an in-process encoder.

pub mod sparse;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::EmbeddingConfig;
use crate::types::SparseVector;

use self::sparse::Bm25Encoder;

/// Unified embedding oracle trait. Both capabilities are pure functions of
/// their input; a failure is fatal to the operation that requested the
/// embedding, not to the session.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dense embedding of a single text.
    async fn dense(&self, text: &str) -> Result<Vec<f32>>;

    /// Sparse BM25-style embedding of a single text.
    fn sparse(&self, text: &str) -> SparseVector;

    /// Dense embedding dimension.
    fn dimension(&self) -> usize;

    /// Batch dense embedding, used at indexing time.
    async fn dense_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.dense(text).await?);
        }
        Ok(out)
    }
}

/// Cosine similarity with a guarded denominator.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + 1e-9)
}

/// Embedder backed by a text-embeddings-inference style HTTP service for the
/// dense side and a deterministic BM25 encoder for the sparse side.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    endpoint: String,
    dimension: usize,
    bm25: Bm25Encoder,
}

impl RemoteEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embed", cfg.endpoint.trim_end_matches('/')),
            dimension: cfg.dimension,
            bm25: Bm25Encoder::default(),
        })
    }

    async fn embed_inputs(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = json!({ "inputs": inputs });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("embedding request to {} timed out", self.endpoint)
                } else if e.is_connect() {
                    anyhow!("failed to connect to embedding service at {}: {}", self.endpoint, e)
                } else {
                    anyhow!("embedding request to {} failed: {}", self.endpoint, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("embedding service error ({}): {}", status, preview));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .context("failed to parse embedding service response")?;

        if vectors.len() != inputs.len() {
            return Err(anyhow!(
                "embedding service returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            ));
        }
        for v in &vectors {
            if v.len() != self.dimension {
                return Err(anyhow!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    v.len()
                ));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn dense(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_inputs(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedding service returned no vector"))
    }

    fn sparse(&self, text: &str) -> SparseVector {
        self.bm25.encode(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn dense_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embed_inputs(&refs).await
    }
}
