use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::memory::{
    Compactor, ConversationMemoryStore, LazyVectorIndex, SessionReconciler, SessionRegistry,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub index: Arc<LazyVectorIndex>,
    pub store: Arc<ConversationMemoryStore>,
    pub sessions: SessionRegistry,
    pub reconciler: Arc<SessionReconciler>,
    pub compactor: Arc<Compactor>,
}

impl FromRef<AppState> for Arc<ConversationMemoryStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<SessionReconciler> {
    fn from_ref(state: &AppState) -> Self {
        state.reconciler.clone()
    }
}

impl FromRef<AppState> for Arc<Compactor> {
    fn from_ref(state: &AppState) -> Self {
        state.compactor.clone()
    }
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
