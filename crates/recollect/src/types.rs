use serde::{Deserialize, Serialize};

use crate::session::nav::NavNode;

/// What part of a document a chunk was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Title,
    Summary,
    Content,
}

impl ChunkType {
    pub fn parse(s: &str) -> Self {
        match s {
            "title" => Self::Title,
            "summary" => Self::Summary,
            _ => Self::Content,
        }
    }
}

/// One retrieved chunk. Immutable after the store adapter builds it; the
/// fused retrieval score is set once and read thereafter.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    /// Document the chunk belongs to: the identity the user is searching for.
    pub file: String,
    pub chunk_text: String,
    pub chunk_type: ChunkType,
    pub dense_vector: Vec<f32>,
    pub score: f32,
}

/// Sparse bag-of-words vector: parallel term-hash indices and weights.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Clusters,
    Followup,
    Found,
    Exhausted,
}

/// One answered follow-up question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaTurn {
    pub question: String,
    pub answer: String,
}

/// Best fused score seen for a file, for the ranked file list in the view.
#[derive(Debug, Clone, Serialize)]
pub struct FileScore {
    pub file: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub id: i32,
    pub label: String,
    pub files: Vec<String>,
    pub size: usize,
}

/// Serialized session state returned by every API endpoint. Dense vectors
/// are never exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub round: u32,
    pub query: String,
    pub expanded_query: String,
    pub total_chunks: usize,
    pub files: Vec<String>,
    /// Descending by score. An array rather than a map: JSON object keys
    /// cannot carry ordering.
    pub file_scores: Vec<FileScore>,
    pub conversation: Vec<QaTurn>,
    pub nav_tree: Vec<NavNode>,
    pub current_nav_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clusters: Option<Vec<ClusterView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_followups: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_files: Option<Vec<String>>,
}

/// Metadata for the backing collection, for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub collection: String,
    pub points_count: u64,
    pub status: String,
}
