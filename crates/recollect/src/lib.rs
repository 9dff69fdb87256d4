pub mod cluster;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod session;
pub mod store;
pub mod types;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use embedding::{Embedder, RemoteEmbedder};
pub use error::{EngineError, Result};
pub use llm::{ChatCompletionsClient, LanguageModel};
pub use session::engine::SearchEngine;
pub use store::{QdrantStore, VectorIndex};
pub use types::{
    ChunkType, CollectionInfo, ScoredChunk, SessionStatus, SessionView, SparseVector,
};
