use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    chat, demo,
    error::{ApiResult, AppError},
    models::{ApiResponse, ChatReply, ChatRequest},
    AppState,
};

/// POST /api/chat: answer the storefront chat widget.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> ApiResult<ChatReply> {
    let history = chat::sanitize_history(&body.messages);
    if history.is_empty() {
        return Err(AppError::validation("Mensagem vazia"));
    }

    let api_key = match (&state.config.chat.api_key, state.config.demo_mode) {
        (Some(key), false) => key,
        _ => {
            return Ok(Json(ApiResponse::success(ChatReply {
                reply: demo::CHAT_REPLY.into(),
            })))
        }
    };

    let services = super::storefront::active_services(&state.db).await?;
    let reply = chat::complete(
        &state.http,
        &state.config.chat,
        api_key,
        chat::system_prompt(&services),
        history,
    )
    .await
    .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(ApiResponse::success(ChatReply { reply })))
}
