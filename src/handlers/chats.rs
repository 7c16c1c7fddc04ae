// region:    --- Imports
use super::{parse_chat_id, AppState};
use crate::auth::Actor;
use crate::error::MarketResult;
use crate::marketplace::model::{Chat, ChatMessage};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

// endregion: --- Imports

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    #[serde(default)]
    pub content: String,
}

/// 채팅방 열기 (경로의 id 는 물품 id)
pub async fn handle_open_chat(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    actor: Actor,
) -> MarketResult<impl IntoResponse> {
    let (chat, created) = state.chat.open_chat(&item_id, &actor.user_id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(chat)))
}

/// 내 채팅방 목록
pub async fn handle_list_chats(
    State(state): State<AppState>,
    actor: Actor,
) -> MarketResult<Json<Vec<Chat>>> {
    Ok(Json(state.chat.list_chats(&actor.user_id).await?))
}

/// 채팅방 승인
pub async fn handle_approve_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    actor: Actor,
) -> MarketResult<Json<Chat>> {
    let chat_id = parse_chat_id(&chat_id)?;
    Ok(Json(
        state
            .chat
            .approve_chat(chat_id, &actor.user_id, actor.role)
            .await?,
    ))
}

/// 메시지 조회
pub async fn handle_list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    actor: Actor,
) -> MarketResult<Json<Vec<ChatMessage>>> {
    let chat_id = parse_chat_id(&chat_id)?;
    Ok(Json(
        state.chat.list_messages(chat_id, &actor.user_id).await?,
    ))
}

/// 메시지 작성
pub async fn handle_post_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    actor: Actor,
    Json(body): Json<PostMessageBody>,
) -> MarketResult<impl IntoResponse> {
    let chat_id = parse_chat_id(&chat_id)?;
    let message = state
        .chat
        .post_message(chat_id, &actor.user_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// 채팅방 삭제
pub async fn handle_delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    actor: Actor,
) -> MarketResult<impl IntoResponse> {
    let chat_id = parse_chat_id(&chat_id)?;
    state
        .chat
        .delete_chat(chat_id, &actor.user_id, actor.role)
        .await?;
    Ok(Json(json!({ "deleted": true })))
}
