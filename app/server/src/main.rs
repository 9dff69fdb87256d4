mod routes;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use recollect::{
    ChatCompletionsClient, EngineConfig, QdrantStore, RemoteEmbedder, SearchEngine, VectorIndex,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,recollect=info,recollect_server=info")),
        )
        .init();

    let cfg = EngineConfig::from_env();
    cfg.validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    let llm = Arc::new(ChatCompletionsClient::new(&cfg.llm)?);
    let embedder = Arc::new(RemoteEmbedder::new(&cfg.embedding)?);
    let index = Arc::new(QdrantStore::new(&cfg.qdrant)?);

    // A reachable but empty collection is worth flagging before the first
    // search comes in; an unreachable one should not stop startup.
    match index.collection_info().await {
        Ok(info) if info.points_count == 0 => {
            tracing::warn!(
                collection = %info.collection,
                "collection is empty; index some documents before searching"
            );
        }
        Ok(info) => {
            tracing::info!(
                collection = %info.collection,
                points = info.points_count,
                "connected to vector store"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "vector store not reachable at startup");
        }
    }

    let engine = Arc::new(SearchEngine::new(cfg, llm, embedder, index));
    let app = routes::router(engine);

    let addr = std::env::var("RECOLLECT_ADDR").unwrap_or_else(|_| "0.0.0.0:8111".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "recollect server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
