use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::models::chat::{HistoryQuery, HistoryResponse, SuccessResponse, TurnView, UsersResponse};
use crate::services::memory::types::format_timestamp;
use crate::services::memory::{ConversationMemoryStore, SessionRegistry};
use crate::utils::ApiError;

/// Stored turns of a user, newest first.
pub async fn get_history_handler(
    State(store): State<Arc<ConversationMemoryStore>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or_else(|| store.recent_limit());
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }

    let data = store
        .load_recent(&user_id, limit)
        .await?
        .into_iter()
        .map(|turn| TurnView {
            timestamp: format_timestamp(&turn.timestamp),
            user: turn.user_text,
            bot: turn.bot_text,
            kind: turn.kind,
        })
        .collect();

    Ok(Json(HistoryResponse {
        success: true,
        data,
    }))
}

/// Forget a user: stored records and the live session.
pub async fn delete_history_handler(
    State(store): State<Arc<ConversationMemoryStore>>,
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    // A turn in flight for this user finishes before the wipe
    let mut session = sessions.lock(&user_id).await;
    let success = store.delete_user_history(&user_id).await?;
    session.clear();
    drop(session);
    sessions.evict(&user_id);
    Ok(Json(SuccessResponse { success }))
}

pub async fn list_users_handler(
    State(store): State<Arc<ConversationMemoryStore>>,
) -> Result<Json<UsersResponse>, ApiError> {
    let data = store.list_user_ids().await?.into_iter().collect();
    Ok(Json(UsersResponse {
        success: true,
        data,
    }))
}
