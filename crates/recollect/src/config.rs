use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    /// Named vector space holding the dense embeddings.
    pub dense_vector: String,
    /// Named vector space holding the sparse (BM25-style) vectors.
    pub sparse_vector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the dense embedding service.
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat endpoint (Ollama serves one).
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub top_k: usize,
    /// Fused score at or above which the top hit short-circuits the dialogue.
    pub direct_match_threshold: f32,
    /// Fusion weights, only consulted if RRF is swapped for weighted fusion
    /// inside the store adapter.
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub max_followup_questions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub max_clusters: usize,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.qdrant.url.is_empty() {
            return Err("qdrant.url must be set".into());
        }
        if self.qdrant.collection.is_empty() {
            return Err("qdrant.collection must be set".into());
        }
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.search.top_k == 0 {
            return Err("search.top_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.direct_match_threshold) {
            return Err("search.direct_match_threshold must be in [0.0, 1.0]".into());
        }
        if self.cluster.min_cluster_size < 2 {
            return Err("cluster.min_cluster_size must be >= 2".into());
        }
        if self.cluster.min_samples == 0 {
            return Err("cluster.min_samples must be > 0".into());
        }
        if self.cluster.max_clusters == 0 {
            return Err("cluster.max_clusters must be > 0".into());
        }
        if self.search.max_followup_questions == 0 {
            return Err("search.max_followup_questions must be > 0".into());
        }
        Ok(())
    }

    /// Build a config from defaults with `RECOLLECT_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("RECOLLECT_QDRANT_URL") {
            cfg.qdrant.url = v;
        }
        if let Ok(v) = std::env::var("RECOLLECT_QDRANT_API_KEY") {
            cfg.qdrant.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("RECOLLECT_COLLECTION") {
            cfg.qdrant.collection = v;
        }
        if let Ok(v) = std::env::var("RECOLLECT_EMBEDDING_URL") {
            cfg.embedding.endpoint = v;
        }
        if let Ok(v) = std::env::var("RECOLLECT_EMBEDDING_MODEL") {
            cfg.embedding.model = v;
        }
        if let Ok(v) = std::env::var("RECOLLECT_EMBEDDING_DIM") {
            if let Ok(dim) = v.parse() {
                cfg.embedding.dimension = dim;
            }
        }
        if let Ok(v) = std::env::var("RECOLLECT_LLM_URL") {
            cfg.llm.endpoint = v;
        }
        if let Ok(v) = std::env::var("RECOLLECT_LLM_MODEL") {
            cfg.llm.model = v;
        }
        if let Ok(v) = std::env::var("RECOLLECT_LLM_API_KEY") {
            cfg.llm.api_key = Some(v);
        }
        cfg
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            qdrant: QdrantConfig {
                url: "http://localhost:6333".to_string(),
                api_key: None,
                collection: "recollect_docs".to_string(),
                dense_vector: "dense".to_string(),
                sparse_vector: "sparse".to_string(),
            },
            embedding: EmbeddingConfig {
                endpoint: "http://localhost:8080".to_string(),
                model: "BAAI/bge-large-en-v1.5".to_string(),
                dimension: 1024,
                timeout_secs: 60,
            },
            llm: LlmConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "gemma3:4b".to_string(),
                api_key: None,
                max_tokens: 512,
                temperature: 0.7,
                timeout_secs: 60,
            },
            search: SearchConfig {
                top_k: 100,
                direct_match_threshold: 0.85,
                dense_weight: 0.7,
                sparse_weight: 0.3,
                max_followup_questions: 3,
            },
            cluster: ClusterConfig {
                min_cluster_size: 5,
                min_samples: 2,
                max_clusters: 4,
            },
        }
    }
}
