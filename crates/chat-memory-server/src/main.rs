use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use chat_memory_server::app::{build_router, index_factory};
use chat_memory_server::config::Settings;
use chat_memory_server::logging;
use chat_memory_server::services::memory::{
    Compactor, ConversationMemoryStore, LazyVectorIndex, SessionReconciler, SessionRegistry,
    SimilarityGate,
};
use chat_memory_server::services::{ChatAgent, EmbeddingService, LlmService};
use chat_memory_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logger()?;
    info!("Starting chat memory server...");

    // Load configuration
    let settings = Arc::new(Settings::load()?);
    info!(
        "Configuration loaded (index backend {:?}, threshold {}, window {})",
        settings.vector_index.backend, settings.memory.threshold, settings.memory.window
    );

    let embedder = Arc::new(EmbeddingService::new(&settings.embedding)?);
    let llm = Arc::new(LlmService::new(settings.llm.clone())?);
    let agent = Arc::new(ChatAgent::new(
        llm.clone(),
        settings.prompts.agent_system_prompt.clone(),
    ));

    // Built on first use
    let index = Arc::new(LazyVectorIndex::new(index_factory(&settings)));

    let memory = &settings.memory;
    let gate = SimilarityGate::new(index.clone(), embedder.clone(), memory.threshold, memory.k);
    let store = Arc::new(ConversationMemoryStore::new(
        index.clone(),
        embedder.clone(),
        gate,
        memory.recent_limit,
    ));
    let sessions = SessionRegistry::new(memory.window);
    let reconciler = Arc::new(SessionReconciler::new(
        sessions.clone(),
        store.clone(),
        agent,
    ));
    let compactor = Arc::new(Compactor::new(
        store.clone(),
        sessions.clone(),
        llm,
        settings.prompts.summarize_instruction.clone(),
    ));

    let sweeper = sessions.spawn_sweeper(
        Duration::from_secs(memory.sweep_interval_seconds),
        Duration::from_secs(memory.session_idle_ttl_seconds),
    );

    let state = AppState {
        settings: settings.clone(),
        index: index.clone(),
        store,
        sessions,
        reconciler,
        compactor,
    };
    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    index.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
