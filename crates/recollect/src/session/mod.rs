//! Session state machine.
//!
//! A session owns the narrowing candidate pool and drives it through rounds
//! of cluster → label → pick, with guided follow-up questions and
//! backtracking over the navigation tree. Each operation either completes or
//! leaves the session untouched; the engine enforces that by running
//! operations on a working copy and committing on success.

pub mod engine;
pub mod filter;
pub mod nav;
pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::cluster;
use crate::config::EngineConfig;
use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::llm::{prompts, LanguageModel};
use crate::types::{
    ClusterView, FileScore, QaTurn, ScoredChunk, SessionStatus, SessionView,
};

use self::nav::{NavTree, ROOT_NODE_ID};
use self::snapshot::SnapshotStore;

/// Shared services a session operation needs: the oracles and the config.
pub(crate) struct SessionDeps<'a> {
    pub llm: &'a dyn LanguageModel,
    pub embedder: &'a dyn Embedder,
    pub cfg: &'a EngineConfig,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    original_query: String,
    expanded_query: String,
    /// Current candidate pool; narrows monotonically until a backtrack.
    points: Vec<ScoredChunk>,
    round: u32,
    status: SessionStatus,
    /// Parallel to `points` while clusters are showing; −1 marks noise.
    labels: Vec<i32>,
    cluster_labels: BTreeMap<i32, String>,
    cluster_files: BTreeMap<i32, BTreeSet<String>>,
    cluster_sizes: BTreeMap<i32, usize>,
    conversation: Vec<QaTurn>,
    pending_question: Option<String>,
    followup_count: u32,
    found_file: Option<String>,
    nav: NavTree,
    current_nav_node: Option<String>,
    snapshots: SnapshotStore,
}

impl Session {
    pub(crate) fn new(
        id: String,
        query: &str,
        expanded_query: String,
        hits: Vec<ScoredChunk>,
    ) -> Self {
        let mut nav = NavTree::default();
        nav.add_root(query);
        // The un-narrowed retrieval pool is restorable for the whole session
        // lifetime, whatever happens to the per-round captures.
        let mut snapshots = SnapshotStore::default();
        snapshots.capture(0, &hits, &[], 0);
        Self {
            id,
            created_at: Utc::now(),
            original_query: query.to_string(),
            expanded_query,
            points: hits,
            round: 0,
            status: SessionStatus::Created,
            labels: Vec::new(),
            cluster_labels: BTreeMap::new(),
            cluster_files: BTreeMap::new(),
            cluster_sizes: BTreeMap::new(),
            conversation: Vec::new(),
            pending_question: None,
            followup_count: 0,
            found_file: None,
            nav,
            current_nav_node: Some(ROOT_NODE_ID.to_string()),
            snapshots,
        }
    }

    fn unique_files(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.points.iter().map(|p| p.file.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    fn file_scores(&self) -> Vec<FileScore> {
        let mut best: HashMap<&str, f32> = HashMap::new();
        for pt in &self.points {
            let entry = best.entry(pt.file.as_str()).or_insert(pt.score);
            if pt.score > *entry {
                *entry = pt.score;
            }
        }
        let mut scores: Vec<FileScore> = best
            .into_iter()
            .map(|(file, score)| FileScore {
                file: file.to_string(),
                score,
            })
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file.cmp(&b.file))
        });
        scores
    }

    /// Direct hit on the top retrieved chunk: the dialogue never starts.
    /// The pool is reduced to the matched file so the found state always
    /// holds exactly one file.
    pub(crate) fn mark_direct_match(&mut self) {
        let Some(best) = self.points.first() else {
            return;
        };
        let file = best.file.clone();
        self.points.retain(|p| p.file == file);
        self.found_file = Some(file);
        self.status = SessionStatus::Found;
    }

    /// Start a new clustering round: snapshot the incoming pool, cluster,
    /// label, and extend the navigation tree. With no non-noise clusters the
    /// session switches to guided questioning, or ends once the question
    /// budget is spent.
    pub(crate) async fn recluster(&mut self, deps: &SessionDeps<'_>) {
        self.round += 1;
        self.snapshots.capture(
            self.round,
            &self.points,
            &self.conversation,
            self.followup_count,
        );

        self.labels = cluster::label_chunks(&self.points, &deps.cfg.cluster);
        self.rebuild_cluster_maps();

        if self.cluster_sizes.is_empty() {
            if self.followup_count >= deps.cfg.search.max_followup_questions {
                tracing::info!(
                    session = %self.id,
                    chunks = self.points.len(),
                    "no clusters and question budget spent"
                );
                self.status = SessionStatus::Exhausted;
            } else {
                tracing::info!(session = %self.id, "clustering found no groups, switching to guided questions");
                self.synthesize_question(deps).await;
            }
            return;
        }

        self.label_clusters(deps).await;

        let children: Vec<(i32, String)> = self
            .cluster_labels
            .iter()
            .map(|(&cid, label)| (cid, label.clone()))
            .collect();
        let parent = self
            .current_nav_node
            .clone()
            .unwrap_or_else(|| ROOT_NODE_ID.to_string());
        self.nav.add_children(&parent, self.round, &children);

        tracing::info!(
            session = %self.id,
            round = self.round,
            clusters = children.len(),
            chunks = self.points.len(),
            "clustered candidate pool"
        );
        self.status = SessionStatus::Clusters;
    }

    fn rebuild_cluster_maps(&mut self) {
        self.cluster_labels.clear();
        self.cluster_files.clear();
        self.cluster_sizes.clear();
        for (pt, &label) in self.points.iter().zip(self.labels.iter()) {
            if label < 0 {
                continue;
            }
            self.cluster_files
                .entry(label)
                .or_default()
                .insert(pt.file.clone());
            *self.cluster_sizes.entry(label).or_insert(0) += 1;
        }
    }

    async fn label_clusters(&mut self, deps: &SessionDeps<'_>) {
        let mut cluster_texts: BTreeMap<i32, String> = BTreeMap::new();
        for (pt, &label) in self.points.iter().zip(self.labels.iter()) {
            if label < 0 {
                continue;
            }
            let text = cluster_texts.entry(label).or_default();
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&pt.chunk_text);
        }

        for (&cid, text) in &cluster_texts {
            let label = match deps.llm.generate(&prompts::label_cluster(text)).await {
                Ok(raw) => {
                    let cleaned = prompts::clean_short_answer(&raw);
                    if cleaned.is_empty() {
                        format!("Cluster {}", cid)
                    } else {
                        cleaned
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %self.id, cluster = cid, error = %e, "cluster labeling failed");
                    format!("Cluster {}", cid)
                }
            };
            self.cluster_labels.insert(cid, label);
        }
    }

    async fn synthesize_question(&mut self, deps: &SessionDeps<'_>) {
        let summaries = prompts::file_summaries(&self.points);
        let prompt = prompts::followup_question(
            &summaries,
            &self.conversation,
            self.followup_count + 1,
            deps.cfg.search.max_followup_questions,
        );
        let question = match deps.llm.generate(&prompt).await {
            Ok(raw) => {
                let cleaned = prompts::clean_short_answer(&raw);
                if cleaned.is_empty() {
                    prompts::GENERIC_FOLLOWUP.to_string()
                } else {
                    cleaned
                }
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "question synthesis failed, using generic question");
                prompts::GENERIC_FOLLOWUP.to_string()
            }
        };
        self.pending_question = Some(question);
        self.status = SessionStatus::Followup;
    }

    fn narrow_to(&mut self, cluster_id: i32) -> Result<()> {
        if self.labels.len() != self.points.len() {
            return Err(EngineError::Internal(format!(
                "label vector length {} does not match pool size {}",
                self.labels.len(),
                self.points.len()
            )));
        }
        let labels = std::mem::take(&mut self.labels);
        let points = std::mem::take(&mut self.points);
        self.points = points
            .into_iter()
            .zip(labels)
            .filter(|(_, label)| *label == cluster_id)
            .map(|(pt, _)| pt)
            .collect();
        Ok(())
    }

    pub(crate) async fn pick(&mut self, cluster_id: i32, deps: &SessionDeps<'_>) -> Result<()> {
        if self.status != SessionStatus::Clusters {
            return Err(EngineError::InvalidInput(format!(
                "session is in '{}' state, not 'clusters'",
                self.status.as_str()
            )));
        }
        if !self.cluster_labels.contains_key(&cluster_id) {
            let valid: Vec<i32> = self.cluster_labels.keys().copied().collect();
            return Err(EngineError::InvalidInput(format!(
                "invalid cluster_id {}; valid: {:?}",
                cluster_id, valid
            )));
        }

        let parent = self
            .current_nav_node
            .clone()
            .unwrap_or_else(|| ROOT_NODE_ID.to_string());
        if let Some(node) = self.nav.child_for(&parent, self.round, cluster_id) {
            let node_id = node.node_id.clone();
            self.nav.mark_on_path(&node_id);
            self.current_nav_node = Some(node_id);
        }

        self.narrow_to(cluster_id)?;
        tracing::info!(
            session = %self.id,
            cluster = cluster_id,
            remaining = self.points.len(),
            "narrowed to picked cluster"
        );
        self.evaluate_termination(false, deps).await
    }

    pub(crate) async fn help(&mut self, deps: &SessionDeps<'_>) -> Result<()> {
        if !matches!(
            self.status,
            SessionStatus::Clusters | SessionStatus::Followup
        ) {
            return Err(EngineError::InvalidInput(format!(
                "cannot ask for help in '{}' state",
                self.status.as_str()
            )));
        }
        if self.followup_count >= deps.cfg.search.max_followup_questions {
            return Err(EngineError::InvalidInput(
                "maximum follow-up questions reached".to_string(),
            ));
        }
        self.synthesize_question(deps).await;
        Ok(())
    }

    pub(crate) async fn answer(&mut self, answer: &str, deps: &SessionDeps<'_>) -> Result<()> {
        if self.status != SessionStatus::Followup {
            return Err(EngineError::InvalidInput(format!(
                "no pending question (status='{}')",
                self.status.as_str()
            )));
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(EngineError::InvalidInput(
                "answer must not be empty".to_string(),
            ));
        }
        let Some(question) = self.pending_question.take() else {
            return Err(EngineError::InvalidInput(
                "no pending question".to_string(),
            ));
        };

        self.conversation.push(QaTurn {
            question,
            answer: answer.to_string(),
        });

        // Re-score against everything the user has said so far.
        let context: String = self
            .conversation
            .iter()
            .map(|turn| turn.answer.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let ctx_vec = deps
            .embedder
            .dense(&context)
            .await
            .map_err(EngineError::Oracle)?;

        self.points = filter::filter_by_context(std::mem::take(&mut self.points), &ctx_vec);
        self.followup_count += 1;

        tracing::info!(
            session = %self.id,
            chunks = self.points.len(),
            files = self.unique_files().len(),
            followups = self.followup_count,
            "filtered pool by follow-up answers"
        );
        self.evaluate_termination(true, deps).await
    }

    pub(crate) async fn backtrack(&mut self, node_id: &str, deps: &SessionDeps<'_>) -> Result<()> {
        let Some(node) = self.nav.get(node_id).cloned() else {
            return Err(EngineError::InvalidInput(format!(
                "unknown navigation node: {}",
                node_id
            )));
        };
        let is_root = node.node_id == ROOT_NODE_ID;

        let snapshot = if is_root {
            self.snapshots.earliest()
        } else {
            self.snapshots.restore(node.round)
        };
        let Some(snapshot) = snapshot else {
            return Err(EngineError::InvalidInput(format!(
                "no snapshot available for node {}",
                node_id
            )));
        };

        self.points = snapshot.points;
        self.conversation = snapshot.conversation;
        self.followup_count = snapshot.followup_count;
        self.found_file = None;
        self.pending_question = None;
        self.labels.clear();
        self.cluster_labels.clear();
        self.cluster_files.clear();
        self.cluster_sizes.clear();

        self.nav.prune_beyond(node.round, &node.node_id);
        self.current_nav_node = Some(node.node_id.clone());

        tracing::info!(
            session = %self.id,
            node = %node.node_id,
            chunks = self.points.len(),
            "backtracked"
        );

        if is_root {
            self.snapshots.discard_after(0);
            self.round = 0;
            self.recluster(deps).await;
            return Ok(());
        }

        self.snapshots.discard_after(node.round);
        self.round = node.round.saturating_sub(1);

        let Some(cluster_id) = node.cluster_id else {
            return Err(EngineError::Internal(format!(
                "navigation node {} has no cluster id",
                node.node_id
            )));
        };

        // Labels are not stored in snapshots; the clusterer is deterministic,
        // so re-running it reproduces the labeling the node was picked from.
        self.labels = cluster::label_chunks(&self.points, &deps.cfg.cluster);
        if !self.labels.contains(&cluster_id) {
            return Err(EngineError::Internal(format!(
                "cluster {} was not reproduced when re-entering node {}",
                cluster_id, node.node_id
            )));
        }
        self.narrow_to(cluster_id)?;
        self.evaluate_termination(false, deps).await
    }

    /// Runs after every narrowing. Single file left wins; a pool too small to
    /// keep working ends the session; otherwise keep questioning or start a
    /// fresh clustering round.
    async fn evaluate_termination(
        &mut self,
        after_followup: bool,
        deps: &SessionDeps<'_>,
    ) -> Result<()> {
        let files = self.unique_files();
        if files.len() == 1 {
            let file = files.into_iter().next().unwrap_or_default();
            tracing::info!(session = %self.id, file = %file, "converged to a single file");
            self.found_file = Some(file);
            self.status = SessionStatus::Found;
            return Ok(());
        }
        if self.points.len() < 3 {
            tracing::info!(
                session = %self.id,
                files = files.len(),
                "pool too small to keep narrowing"
            );
            self.status = SessionStatus::Exhausted;
            return Ok(());
        }
        if after_followup
            && self.followup_count < deps.cfg.search.max_followup_questions
            && files.len() > 3
        {
            self.synthesize_question(deps).await;
            return Ok(());
        }
        self.recluster(deps).await;
        Ok(())
    }

    pub(crate) fn view(&self, max_followups: u32) -> SessionView {
        let files = self.unique_files();
        let mut view = SessionView {
            session_id: self.id.clone(),
            status: self.status,
            round: self.round,
            query: self.original_query.clone(),
            expanded_query: self.expanded_query.clone(),
            total_chunks: self.points.len(),
            files: files.clone(),
            file_scores: self.file_scores(),
            conversation: self.conversation.clone(),
            nav_tree: self.nav.nodes().to_vec(),
            current_nav_node: self.current_nav_node.clone(),
            clusters: None,
            pending_question: None,
            followup_count: None,
            max_followups: None,
            found_file: None,
            remaining_files: None,
        };

        match self.status {
            SessionStatus::Clusters => {
                view.clusters = Some(
                    self.cluster_sizes
                        .iter()
                        .map(|(&cid, &size)| ClusterView {
                            id: cid,
                            label: self
                                .cluster_labels
                                .get(&cid)
                                .cloned()
                                .unwrap_or_else(|| format!("Cluster {}", cid)),
                            files: self
                                .cluster_files
                                .get(&cid)
                                .map(|s| s.iter().cloned().collect())
                                .unwrap_or_default(),
                            size,
                        })
                        .collect(),
                );
            }
            SessionStatus::Followup => {
                view.pending_question = self.pending_question.clone();
                view.followup_count = Some(self.followup_count);
                view.max_followups = Some(max_followups);
            }
            SessionStatus::Found => {
                view.found_file = self.found_file.clone();
            }
            SessionStatus::Exhausted => {
                view.remaining_files = Some(files);
            }
            SessionStatus::Created => {}
        }
        view
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Clusters => "clusters",
            SessionStatus::Followup => "followup",
            SessionStatus::Found => "found",
            SessionStatus::Exhausted => "exhausted",
        }
    }
}
