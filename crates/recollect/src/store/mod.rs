//! Vector store adapter.
//!
//! Speaks Qdrant's REST query API: one hybrid request with a dense and a
//! sparse prefetch leg, fused server-side with reciprocal rank fusion.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::QdrantConfig;
use crate::types::{ChunkType, CollectionInfo, ScoredChunk, SparseVector};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Hybrid fused retrieval. Returns up to `limit` chunks with payload and
    /// dense vector attached; the fused score is set on each chunk.
    async fn hybrid_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Collection metadata for the stats endpoint.
    async fn collection_info(&self) -> Result<CollectionInfo>;
}

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dense_name: String,
    sparse_name: String,
}

impl QdrantStore {
    pub fn new(cfg: &QdrantConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("failed to build Qdrant HTTP client")?;

        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            collection: cfg.collection.clone(),
            dense_name: cfg.dense_vector.clone(),
            sparse_name: cfg.sparse_vector.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key.clone());
        }
        builder
    }

    async fn read_json(response: reqwest::Response, what: &str) -> Result<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read {} response", what))?;
        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("{} failed ({}): {}", what, status, preview));
        }
        serde_json::from_str(&body).with_context(|| format!("failed to parse {} response", what))
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn hybrid_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let request = json!({
            "prefetch": [
                {
                    "query": dense,
                    "using": self.dense_name,
                    "limit": limit,
                },
                {
                    "query": {
                        "indices": sparse.indices,
                        "values": sparse.values,
                    },
                    "using": self.sparse_name,
                    "limit": limit,
                },
            ],
            "query": { "fusion": "rrf" },
            "limit": limit,
            "with_payload": true,
            "with_vector": [self.dense_name],
        });

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/query", self.collection),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("hybrid query to {} failed: {}", self.base_url, e))?;

        let body = Self::read_json(response, "hybrid query").await?;
        let parsed: QueryResponse =
            serde_json::from_value(body).context("unexpected hybrid query response shape")?;

        Ok(parsed
            .result
            .points
            .into_iter()
            .map(|point| point.into_chunk(&self.dense_name))
            .collect())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await
            .map_err(|e| anyhow!("collection info request to {} failed: {}", self.base_url, e))?;

        let body = Self::read_json(response, "collection info").await?;
        let points_count = body["result"]["points_count"].as_u64().unwrap_or(0);
        let status = body["result"]["status"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        Ok(CollectionInfo {
            collection: self.collection.clone(),
            points_count,
            status,
        })
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: serde_json::Map<String, Value>,
    #[serde(default)]
    vector: Option<Value>,
}

impl ScoredPoint {
    fn into_chunk(self, dense_name: &str) -> ScoredChunk {
        // Point ids are either unsigned integers or UUID strings.
        let id = match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        // Named vectors arrive as an object keyed by space; a bare array is
        // the single-vector legacy shape.
        let dense_vector = match &self.vector {
            Some(Value::Object(map)) => map
                .get(dense_name)
                .and_then(parse_f32_vec)
                .unwrap_or_default(),
            Some(array @ Value::Array(_)) => parse_f32_vec(array).unwrap_or_default(),
            _ => Vec::new(),
        };

        let payload_str = |key: &str| -> &str {
            self.payload.get(key).and_then(Value::as_str).unwrap_or("")
        };

        let file = {
            let f = payload_str("file");
            if f.is_empty() { "unknown" } else { f }.to_string()
        };

        ScoredChunk {
            id,
            file,
            chunk_text: payload_str("chunk").to_string(),
            chunk_type: ChunkType::parse(payload_str("chunk_type")),
            dense_vector,
            score: self.score,
        }
    }
}

fn parse_f32_vec(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_vector_response() {
        let body = r#"{
            "result": {
                "points": [
                    {
                        "id": "3f2a",
                        "score": 0.73,
                        "payload": {
                            "chunk": "Rainfall analysis for the Juba basin",
                            "file": "somalia_floods.pdf",
                            "chunk_type": "summary"
                        },
                        "vector": { "dense": [0.1, 0.2, 0.3] }
                    }
                ]
            }
        }"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        let chunk = parsed
            .result
            .points
            .into_iter()
            .next()
            .unwrap()
            .into_chunk("dense");

        assert_eq!(chunk.id, "3f2a");
        assert_eq!(chunk.file, "somalia_floods.pdf");
        assert_eq!(chunk.chunk_type, ChunkType::Summary);
        assert_eq!(chunk.dense_vector, vec![0.1, 0.2, 0.3]);
        assert!((chunk.score - 0.73).abs() < 1e-6);
    }

    #[test]
    fn parses_integer_id_and_bare_vector() {
        let body = r#"{
            "result": {
                "points": [
                    { "id": 42, "score": 0.5, "payload": {}, "vector": [1.0, 0.0] }
                ]
            }
        }"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        let chunk = parsed
            .result
            .points
            .into_iter()
            .next()
            .unwrap()
            .into_chunk("dense");

        assert_eq!(chunk.id, "42");
        assert_eq!(chunk.file, "unknown");
        assert_eq!(chunk.chunk_type, ChunkType::Content);
        assert_eq!(chunk.dense_vector, vec![1.0, 0.0]);
    }

    #[test]
    fn missing_vector_yields_empty() {
        let body = r#"{
            "result": {
                "points": [ { "id": 1, "score": 0.1 } ]
            }
        }"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        let chunk = parsed
            .result
            .points
            .into_iter()
            .next()
            .unwrap()
            .into_chunk("dense");
        assert!(chunk.dense_vector.is_empty());
    }
}
