use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use soko_types::ChatId;
use soko_types::api::{Claims, MessagesQuery};
use soko_types::models::{Message, NewMessage};

use crate::error::ApiResult;
use crate::state::AppState;

/// Full history, or only what follows `since` (and `after_seq`) for polling clients.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<MessagesQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Message>>> {
    state.chat.registry().get_chat(chat_id, claims.user_id()).await?;

    let stream = state.chat.messages();
    let messages = match query.cursor() {
        Some(after) => stream.fetch_since(chat_id, after).await?,
        None => stream.fetch_all(chat_id).await?,
    };
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = state
        .chat
        .messages()
        .append_message(chat_id, claims.user_id(), claims.name.clone(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
