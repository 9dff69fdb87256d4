//! Search engine: owns the oracles, the vector store, and the table of live
//! sessions. Operations on one session are strictly serialized by its lock;
//! different sessions progress in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::llm::{prompts, LanguageModel};
use crate::store::VectorIndex;
use crate::types::{CollectionInfo, SessionView};

use super::{Session, SessionDeps};

pub struct SearchEngine {
    cfg: EngineConfig,
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SearchEngine {
    pub fn new(
        cfg: EngineConfig,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            cfg,
            llm,
            embedder,
            index,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    fn deps(&self) -> SessionDeps<'_> {
        SessionDeps {
            llm: self.llm.as_ref(),
            embedder: self.embedder.as_ref(),
            cfg: &self.cfg,
        }
    }

    fn max_followups(&self) -> u32 {
        self.cfg.search.max_followup_questions
    }

    fn get(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Start a new search session: expand the query, run the hybrid
    /// retrieval, then either short-circuit on a direct match or open the
    /// first clustering round.
    pub async fn start_search(&self, query: &str) -> Result<SessionView> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        let expanded = match self.llm.generate(&prompts::expand_query(query)).await {
            Ok(text) => {
                let cleaned = text.trim().to_string();
                if cleaned.is_empty() {
                    query.to_string()
                } else {
                    tracing::info!(expanded = %prompts::truncate(&cleaned, 200), "expanded query");
                    cleaned
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "query expansion failed, using original query");
                query.to_string()
            }
        };

        let dense = self
            .embedder
            .dense(&expanded)
            .await
            .map_err(EngineError::Oracle)?;
        let sparse = self.embedder.sparse(&expanded);
        let hits = self
            .index
            .hybrid_search(&dense, &sparse, self.cfg.search.top_k)
            .await
            .map_err(EngineError::Oracle)?;

        if hits.is_empty() {
            return Err(EngineError::NoResults(query.to_string()));
        }

        let session_id = short_session_id();
        let top_score = hits[0].score;
        let mut session = Session::new(session_id.clone(), query, expanded, hits);

        if top_score >= self.cfg.search.direct_match_threshold {
            session.mark_direct_match();
            tracing::info!(
                session = %session_id,
                score = top_score,
                "direct match, skipping the dialogue"
            );
        } else {
            session.recluster(&self.deps()).await;
        }

        let view = session.view(self.max_followups());
        self.sessions
            .insert(session_id, Arc::new(Mutex::new(session)));
        Ok(view)
    }

    pub async fn session_view(&self, session_id: &str) -> Result<SessionView> {
        let session = self.get(session_id)?;
        let guard = session.lock().await;
        Ok(guard.view(self.max_followups()))
    }

    pub async fn pick(&self, session_id: &str, cluster_id: i32) -> Result<SessionView> {
        let session = self.get(session_id)?;
        let mut guard = session.lock().await;
        // Work on a copy; commit only on success so a failed operation
        // leaves the session exactly as it was.
        let mut working = guard.clone();
        working.pick(cluster_id, &self.deps()).await?;
        *guard = working;
        Ok(guard.view(self.max_followups()))
    }

    pub async fn help(&self, session_id: &str) -> Result<SessionView> {
        let session = self.get(session_id)?;
        let mut guard = session.lock().await;
        let mut working = guard.clone();
        working.help(&self.deps()).await?;
        *guard = working;
        Ok(guard.view(self.max_followups()))
    }

    pub async fn answer(&self, session_id: &str, answer: &str) -> Result<SessionView> {
        let session = self.get(session_id)?;
        let mut guard = session.lock().await;
        let mut working = guard.clone();
        working.answer(answer, &self.deps()).await?;
        *guard = working;
        Ok(guard.view(self.max_followups()))
    }

    pub async fn backtrack(&self, session_id: &str, node_id: &str) -> Result<SessionView> {
        let session = self.get(session_id)?;
        let mut guard = session.lock().await;
        let mut working = guard.clone();
        working.backtrack(node_id, &self.deps()).await?;
        *guard = working;
        Ok(guard.view(self.max_followups()))
    }

    /// Remove a session. Deleting an unknown id is not an error.
    pub fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            tracing::info!(session = %session_id, "session deleted");
        }
        removed
    }

    pub async fn collection_stats(&self) -> Result<CollectionInfo> {
        self.index
            .collection_info()
            .await
            .map_err(EngineError::Oracle)
    }
}

fn short_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
