use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::chat::{CallerHistory, ChatRequest, ChatResponse, SuccessResponse};
use crate::services::memory::{Compactor, SessionReconciler};
use crate::utils::ApiError;

pub async fn chat_handler(
    State(reconciler): State<Arc<SessionReconciler>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let start_time = Instant::now();

    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let caller_history = request.chat_history.and_then(CallerHistory::into_entries);

    info!(
        "Chat request: user={:?}, question_len={}, caller_history={:?}, use_history={}",
        user_id,
        question.len(),
        caller_history.as_ref().map(Vec::len),
        request.use_history
    );

    let output = match (request.use_history, user_id) {
        (false, user_id) => reconciler.invoke_stateless(question, user_id).await?,
        (true, Some(user_id)) => {
            reconciler
                .resolve_and_invoke(user_id, question, caller_history)
                .await?
        }
        (true, None) => reconciler.invoke_anonymous(question, caller_history).await?,
    };

    info!("Chat answered in {}ms", start_time.elapsed().as_millis());
    Ok(Json(ChatResponse {
        success: true,
        data: output,
    }))
}

pub async fn summarize_handler(
    State(compactor): State<Arc<Compactor>>,
    Path(user_id): Path<String>,
) -> Json<SuccessResponse> {
    let success = compactor.summarize_user_history(&user_id).await;
    Json(SuccessResponse { success })
}
