//! End-to-end session flows driven through the engine with mock oracles.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use recollect::types::ClusterView;
use recollect::{
    ChunkType, CollectionInfo, Embedder, EngineConfig, EngineError, LanguageModel, ScoredChunk,
    SearchEngine, SessionStatus, SessionView, SparseVector, VectorIndex,
};

struct MockLm {
    fail: bool,
}

#[async_trait]
impl LanguageModel for MockLm {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        if self.fail {
            return Err(anyhow!("model offline"));
        }
        if prompt.contains("Expanded query:") {
            Ok("flood reports, inundation maps, rainfall analysis".to_string())
        } else if prompt.contains("Label:") {
            Ok("\"Topic group\"".to_string())
        } else {
            Ok("Was the document about Kenya?".to_string())
        }
    }
}

/// Dense vectors keyed by keyword so answers can steer the follow-up filter.
struct MockEmbedder {
    dim: usize,
    keyed: Vec<(String, Vec<f32>)>,
}

impl MockEmbedder {
    fn plain(dim: usize) -> Self {
        Self {
            dim,
            keyed: Vec::new(),
        }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn dense(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        for (key, vector) in &self.keyed {
            if lower.contains(key) {
                return Ok(vector.clone());
            }
        }
        let mut v = vec![0.0; self.dim];
        v[0] = 1.0;
        Ok(v)
    }

    fn sparse(&self, _text: &str) -> SparseVector {
        SparseVector {
            indices: vec![],
            values: vec![],
        }
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

struct MockIndex {
    hits: Vec<ScoredChunk>,
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn hybrid_search(
        &self,
        _dense: &[f32],
        _sparse: &SparseVector,
        _limit: usize,
    ) -> anyhow::Result<Vec<ScoredChunk>> {
        Ok(self.hits.clone())
    }

    async fn collection_info(&self) -> anyhow::Result<CollectionInfo> {
        Ok(CollectionInfo {
            collection: "test".to_string(),
            points_count: self.hits.len() as u64,
            status: "green".to_string(),
        })
    }
}

fn chunk(id: usize, file: &str, vector: Vec<f32>, score: f32) -> ScoredChunk {
    ScoredChunk {
        id: id.to_string(),
        file: file.to_string(),
        chunk_text: format!("excerpt {} from {}", id, file),
        chunk_type: ChunkType::Content,
        dense_vector: vector,
        score,
    }
}

/// A tight group along one axis; jitter on the last axis keeps every pairwise
/// gap distinct and small relative to inter-group distances.
fn blob(dim: usize, axis: usize, tilt: Option<(usize, f32)>, count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|i| {
            let mut v = vec![0.0f32; dim];
            v[axis] = 1.0;
            if let Some((tilt_axis, amount)) = tilt {
                v[tilt_axis] = amount;
            }
            v[dim - 1] += 0.001 * i as f32 + 0.00002 * (i * i) as f32;
            v
        })
        .collect()
}

fn engine(hits: Vec<ScoredChunk>, lm_fail: bool, embedder: MockEmbedder) -> SearchEngine {
    SearchEngine::new(
        EngineConfig::default(),
        Arc::new(MockLm { fail: lm_fail }),
        Arc::new(embedder),
        Arc::new(MockIndex { hits }),
    )
}

/// 90-chunk pool: one small group with two same-axis sub-groups (files x/y)
/// and two large single-file groups. The sub-groups are too small to stand
/// alone at the first round's minimum cluster size, so they surface only
/// after narrowing.
fn layered_pool(dim: usize) -> Vec<ScoredChunk> {
    let mut hits = Vec::new();
    let mut id = 0;
    for v in blob(dim, 0, Some((4, 0.35)), 5) {
        hits.push(chunk(id, "x.pdf", v, 0.5));
        id += 1;
    }
    for v in blob(dim, 0, Some((4, -0.35)), 5) {
        hits.push(chunk(id, "y.pdf", v, 0.45));
        id += 1;
    }
    for v in blob(dim, 1, None, 40) {
        hits.push(chunk(id, "b.pdf", v, 0.4));
        id += 1;
    }
    for v in blob(dim, 2, None, 40) {
        hits.push(chunk(id, "c.pdf", v, 0.35));
        id += 1;
    }
    hits
}

fn cluster_with_file<'a>(view: &'a SessionView, file: &str) -> &'a ClusterView {
    view.clusters
        .as_ref()
        .expect("clusters should be present")
        .iter()
        .find(|c| c.files.iter().any(|f| f == file))
        .expect("no cluster contains the file")
}

#[tokio::test]
async fn direct_match_short_circuits_the_dialogue() {
    let mut hits = vec![chunk(0, "somalia_floods.pdf", vec![1.0, 0.0, 0.0, 0.0], 0.92)];
    hits.push(chunk(1, "somalia_floods.pdf", vec![1.0, 0.1, 0.0, 0.0], 0.7));
    hits.push(chunk(2, "kenya_drought.pdf", vec![0.0, 1.0, 0.0, 0.0], 0.6));

    let engine = engine(hits, false, MockEmbedder::plain(4));
    let view = engine.start_search("somalia flood methodology").await.unwrap();

    assert_eq!(view.status, SessionStatus::Found);
    assert_eq!(view.found_file.as_deref(), Some("somalia_floods.pdf"));
    assert_eq!(view.round, 0);
    assert!(view.clusters.is_none());
    assert_eq!(view.files, vec!["somalia_floods.pdf"]);
    assert_eq!(view.total_chunks, 2);
}

#[tokio::test]
async fn clustering_then_single_file_pick_finds_the_document() {
    let dim = 4;
    let mut hits = Vec::new();
    for (i, v) in blob(dim, 0, None, 10).into_iter().enumerate() {
        hits.push(chunk(i, "a.pdf", v, 0.5));
    }
    for (i, v) in blob(dim, 1, None, 10).into_iter().enumerate() {
        hits.push(chunk(10 + i, "b.pdf", v, 0.4));
    }

    let engine = engine(hits, false, MockEmbedder::plain(dim));
    let view = engine.start_search("vague memory of a report").await.unwrap();

    assert_eq!(view.status, SessionStatus::Clusters);
    assert_eq!(view.round, 1);
    let clusters = view.clusters.as_ref().unwrap();
    assert_eq!(clusters.len(), 2);
    assert!(clusters.iter().all(|c| c.label == "Topic group"));

    let target = cluster_with_file(&view, "a.pdf").id;
    let after = engine.pick(&view.session_id, target).await.unwrap();
    assert_eq!(after.status, SessionStatus::Found);
    assert_eq!(after.found_file.as_deref(), Some("a.pdf"));
}

#[tokio::test]
async fn two_round_narrowing_reaches_a_single_file() {
    let dim = 8;
    let engine = engine(layered_pool(dim), false, MockEmbedder::plain(dim));
    let view = engine.start_search("methodology notes").await.unwrap();

    assert_eq!(view.status, SessionStatus::Clusters);
    assert_eq!(view.round, 1);
    assert_eq!(view.total_chunks, 90);
    assert_eq!(view.clusters.as_ref().unwrap().len(), 3);

    // The mixed group holds both small files.
    let mixed = cluster_with_file(&view, "x.pdf");
    assert!(mixed.files.iter().any(|f| f == "y.pdf"));
    let mixed_id = mixed.id;

    let round2 = engine.pick(&view.session_id, mixed_id).await.unwrap();
    assert_eq!(round2.status, SessionStatus::Clusters);
    assert_eq!(round2.round, 2);
    assert_eq!(round2.total_chunks, 10);
    assert_eq!(round2.files, vec!["x.pdf", "y.pdf"]);
    let subclusters = round2.clusters.as_ref().unwrap();
    assert_eq!(subclusters.len(), 2);

    let x_cluster = cluster_with_file(&round2, "x.pdf").id;
    let done = engine.pick(&round2.session_id, x_cluster).await.unwrap();
    assert_eq!(done.status, SessionStatus::Found);
    assert_eq!(done.found_file.as_deref(), Some("x.pdf"));
    // Pool only ever shrank along the pick path.
    assert!(done.total_chunks <= round2.total_chunks);
    assert!(round2.total_chunks <= view.total_chunks);
}

#[tokio::test]
async fn help_question_and_answer_narrow_the_pool() {
    let dim = 4;
    let mut kenya_axis = vec![0.0; dim];
    kenya_axis[0] = 1.0;

    let mut hits = Vec::new();
    for (i, v) in blob(dim, 0, None, 10).into_iter().enumerate() {
        hits.push(chunk(i, "kenya_floods.pdf", v, 0.5));
    }
    for (i, v) in blob(dim, 1, None, 10).into_iter().enumerate() {
        hits.push(chunk(10 + i, "asia_monsoon.pdf", v, 0.4));
    }

    let embedder = MockEmbedder {
        dim,
        keyed: vec![("kenya".to_string(), kenya_axis)],
    };
    let engine = engine(hits, false, embedder);
    let view = engine.start_search("a flood study").await.unwrap();
    assert_eq!(view.status, SessionStatus::Clusters);

    let helped = engine.help(&view.session_id).await.unwrap();
    assert_eq!(helped.status, SessionStatus::Followup);
    assert_eq!(helped.followup_count, Some(0));
    assert_eq!(helped.max_followups, Some(3));
    let question = helped.pending_question.clone().unwrap();
    assert!(!question.is_empty());

    let answered = engine
        .answer(&view.session_id, "it was about Kenya")
        .await
        .unwrap();
    assert_eq!(answered.status, SessionStatus::Found);
    assert_eq!(answered.found_file.as_deref(), Some("kenya_floods.pdf"));
    assert_eq!(answered.conversation.len(), 1);
    assert_eq!(answered.conversation[0].question, question);
}

#[tokio::test]
async fn answer_in_clusters_state_is_rejected() {
    let dim = 4;
    let mut hits = Vec::new();
    for (i, v) in blob(dim, 0, None, 10).into_iter().enumerate() {
        hits.push(chunk(i, "a.pdf", v, 0.5));
    }
    for (i, v) in blob(dim, 1, None, 10).into_iter().enumerate() {
        hits.push(chunk(10 + i, "b.pdf", v, 0.4));
    }
    let engine = engine(hits, false, MockEmbedder::plain(dim));
    let view = engine.start_search("anything").await.unwrap();
    assert_eq!(view.status, SessionStatus::Clusters);

    let err = engine
        .answer(&view.session_id, "some answer")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    // The failed call changed nothing.
    let unchanged = engine.session_view(&view.session_id).await.unwrap();
    assert_eq!(unchanged.status, SessionStatus::Clusters);
    assert_eq!(unchanged.total_chunks, view.total_chunks);
}

#[tokio::test]
async fn backtrack_reenters_an_earlier_cluster() {
    let dim = 8;
    let engine = engine(layered_pool(dim), false, MockEmbedder::plain(dim));
    let view = engine.start_search("methodology notes").await.unwrap();
    let session_id = view.session_id.clone();

    let mixed_id = cluster_with_file(&view, "x.pdf").id;
    let mixed_node = format!("c{}-r1", mixed_id);

    let round2 = engine.pick(&session_id, mixed_id).await.unwrap();
    let x_cluster = cluster_with_file(&round2, "x.pdf").id;
    let found = engine.pick(&session_id, x_cluster).await.unwrap();
    assert_eq!(found.status, SessionStatus::Found);

    let back = engine.backtrack(&session_id, &mixed_node).await.unwrap();
    assert_eq!(back.status, SessionStatus::Clusters);
    assert_eq!(back.round, 1);
    assert_eq!(back.current_nav_node.as_deref(), Some(mixed_node.as_str()));
    assert_eq!(back.total_chunks, 10);
    assert_eq!(back.files, vec!["x.pdf", "y.pdf"]);
    assert!(back.conversation.is_empty());
    assert!(back.found_file.is_none());
    assert!(back.nav_tree.iter().all(|n| n.round <= 1));

    // The target's siblings survived as alternatives; only the target is
    // on-path among them.
    let siblings: Vec<_> = back
        .nav_tree
        .iter()
        .filter(|n| n.parent_node_id.as_deref() == Some("root"))
        .collect();
    assert_eq!(siblings.len(), 3);
    assert!(siblings
        .iter()
        .all(|n| n.on_path == (n.node_id == mixed_node)));
}

#[tokio::test]
async fn backtrack_to_root_restores_the_original_pool() {
    let dim = 8;
    let engine = engine(layered_pool(dim), false, MockEmbedder::plain(dim));
    let view = engine.start_search("methodology notes").await.unwrap();
    let session_id = view.session_id.clone();

    let mixed_id = cluster_with_file(&view, "x.pdf").id;
    let round2 = engine.pick(&session_id, mixed_id).await.unwrap();
    let x_cluster = cluster_with_file(&round2, "x.pdf").id;
    engine.pick(&session_id, x_cluster).await.unwrap();

    let back = engine.backtrack(&session_id, "root").await.unwrap();
    assert_eq!(back.status, SessionStatus::Clusters);
    assert_eq!(back.total_chunks, 90);
    assert_eq!(back.round, 1);
    assert!(back.conversation.is_empty());
    assert_eq!(back.current_nav_node.as_deref(), Some("root"));
    assert_eq!(back.clusters.as_ref().unwrap().len(), 3);

    // The whole exploration is replayable from here.
    let again = engine.pick(&session_id, cluster_with_file(&back, "b.pdf").id).await.unwrap();
    assert_eq!(again.status, SessionStatus::Found);
    assert_eq!(again.found_file.as_deref(), Some("b.pdf"));
}

#[tokio::test]
async fn backtrack_to_unknown_node_is_a_client_error() {
    let dim = 8;
    let engine = engine(layered_pool(dim), false, MockEmbedder::plain(dim));
    let view = engine.start_search("methodology notes").await.unwrap();

    let err = engine
        .backtrack(&view.session_id, "c7-r9")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn llm_outage_degrades_to_fallback_labels() {
    let dim = 4;
    let mut hits = Vec::new();
    for (i, v) in blob(dim, 0, None, 10).into_iter().enumerate() {
        hits.push(chunk(i, "a.pdf", v, 0.5));
    }
    for (i, v) in blob(dim, 1, None, 10).into_iter().enumerate() {
        hits.push(chunk(10 + i, "b.pdf", v, 0.4));
    }

    let engine = engine(hits, true, MockEmbedder::plain(dim));
    let view = engine.start_search("drought report").await.unwrap();

    assert_eq!(view.status, SessionStatus::Clusters);
    assert_eq!(view.expanded_query, "drought report");
    let labels: Vec<&str> = view
        .clusters
        .as_ref()
        .unwrap()
        .iter()
        .map(|c| c.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Cluster 0", "Cluster 1"]);
}

#[tokio::test]
async fn empty_retrieval_reports_no_results() {
    let engine = engine(Vec::new(), false, MockEmbedder::plain(4));
    let err = engine.start_search("nothing matches this").await.unwrap_err();
    assert!(matches!(err, EngineError::NoResults(_)));
}

#[tokio::test]
async fn deleted_sessions_are_gone() {
    let dim = 4;
    let hits = vec![chunk(0, "a.pdf", vec![1.0, 0.0, 0.0, 0.0], 0.9)];
    let engine = engine(hits, false, MockEmbedder::plain(dim));
    let view = engine.start_search("a report").await.unwrap();

    assert!(engine.delete(&view.session_id));
    assert!(!engine.delete(&view.session_id));
    let err = engine.session_view(&view.session_id).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let engine = engine(Vec::new(), false, MockEmbedder::plain(4));
    let err = engine.session_view("does-not-exist").await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
    let err = engine.pick("does-not-exist", 0).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}
