use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::memory::{ConversationMemoryStore, SessionRegistry};

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    active_sessions: usize,
}

pub async fn health_check(State(sessions): State<SessionRegistry>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_sessions: sessions.stats().active_sessions,
        }),
    )
}

/// Ready once the vector index answers.
pub async fn readiness_check(State(store): State<Arc<ConversationMemoryStore>>) -> StatusCode {
    if store.is_reachable().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
