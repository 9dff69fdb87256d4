//! HTTP surface for the session engine. Every state-changing endpoint
//! returns the full serialized session view.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use recollect::{EngineError, SearchEngine, SessionView};

pub fn router(engine: Arc<SearchEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/collection/stats", get(collection_stats))
        .route("/search", post(start_search))
        .route("/session/:id", get(get_session).delete(delete_session))
        .route("/session/:id/pick", post(pick_cluster))
        .route("/session/:id/help", post(ask_for_help))
        .route("/session/:id/answer", post(answer_followup))
        .route("/session/:id/backtrack", post(backtrack_session))
        .layer(cors)
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
struct PickRequest {
    cluster_id: i32,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct BacktrackRequest {
    node_id: String,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: String,
}

/// Engine error wrapper that maps error kinds onto HTTP status codes.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::SessionNotFound(_) | EngineError::NoResults(_) => StatusCode::NOT_FOUND,
            EngineError::Oracle(_) => StatusCode::BAD_GATEWAY,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<SessionView>, ApiError>;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn collection_stats(
    State(engine): State<Arc<SearchEngine>>,
) -> Result<Json<recollect::CollectionInfo>, ApiError> {
    Ok(Json(engine.collection_stats().await?))
}

async fn start_search(
    State(engine): State<Arc<SearchEngine>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult {
    Ok(Json(engine.start_search(&req.query).await?))
}

async fn get_session(
    State(engine): State<Arc<SearchEngine>>,
    Path(id): Path<String>,
) -> ApiResult {
    Ok(Json(engine.session_view(&id).await?))
}

async fn pick_cluster(
    State(engine): State<Arc<SearchEngine>>,
    Path(id): Path<String>,
    Json(req): Json<PickRequest>,
) -> ApiResult {
    Ok(Json(engine.pick(&id, req.cluster_id).await?))
}

async fn ask_for_help(
    State(engine): State<Arc<SearchEngine>>,
    Path(id): Path<String>,
) -> ApiResult {
    Ok(Json(engine.help(&id).await?))
}

async fn answer_followup(
    State(engine): State<Arc<SearchEngine>>,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult {
    Ok(Json(engine.answer(&id, &req.answer).await?))
}

async fn backtrack_session(
    State(engine): State<Arc<SearchEngine>>,
    Path(id): Path<String>,
    Json(req): Json<BacktrackRequest>,
) -> ApiResult {
    Ok(Json(engine.backtrack(&id, &req.node_id).await?))
}

async fn delete_session(
    State(engine): State<Arc<SearchEngine>>,
    Path(id): Path<String>,
) -> Json<DeleteResponse> {
    engine.delete(&id);
    Json(DeleteResponse { deleted: id })
}
