use axum::{
    routing::{get, post},
    Router,
};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use crate::config::{IndexBackend, Settings};
use crate::database::{DbPool, PgVectorIndex};
use crate::handlers;
use crate::services::memory::{IndexFactory, InMemoryVectorIndex, VectorIndex};
use crate::state::AppState;

/// Deferred construction of the configured vector index backend.
pub fn index_factory(settings: &Settings) -> IndexFactory {
    match settings.vector_index.backend {
        IndexBackend::Memory => Box::new(|| {
            async {
                info!("Using in-process vector index");
                Ok::<_, anyhow::Error>(Arc::new(InMemoryVectorIndex::new()) as Arc<dyn VectorIndex>)
            }
            .boxed()
        }),
        IndexBackend::Postgres => {
            let database = settings.database.clone();
            let dimension = settings.embedding.dimension;
            Box::new(move || {
                let database = database.clone();
                async move {
                    info!("Connecting pgvector index");
                    let pool = DbPool::new(&database).await?;
                    let index = PgVectorIndex::connect(pool, dimension).await?;
                    Ok::<_, anyhow::Error>(Arc::new(index) as Arc<dyn VectorIndex>)
                }
                .boxed()
            })
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.settings.server.request_timeout_seconds);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/chat", post(handlers::chat::chat_handler))
        .route("/summarize/{user_id}", post(handlers::chat::summarize_handler))
        .route(
            "/history/{user_id}",
            get(handlers::history::get_history_handler)
                .delete(handlers::history::delete_history_handler),
        )
        .route("/users", get(handlers::history::list_users_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
}
