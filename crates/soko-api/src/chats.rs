use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use soko_chat::suggestions::message_suggestions;
use soko_types::api::{
    Claims, ListChatsQuery, MuteResponse, OpenChatRequest, ReportRequest, SuggestionsResponse,
};
use soko_types::models::{Chat, Listing};
use soko_types::{ChatId, UserId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn open_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenChatRequest>,
) -> ApiResult<Json<Chat>> {
    let chat = state
        .chat
        .registry()
        .open_or_create_chat(claims.user_id(), req.listing_id, req.owner_id)
        .await?;
    Ok(Json(chat))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ListChatsQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Chat>>> {
    let registry = state.chat.registry();
    let chats = if query.archived {
        registry.list_archived_chats(claims.user_id()).await?
    } else {
        registry.list_chats_for_user(claims.user_id()).await?
    };
    Ok(Json(chats))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Chat>> {
    let chat = state.chat.registry().get_chat(chat_id, claims.user_id()).await?;
    Ok(Json(chat))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    state.chat.lifecycle().delete(chat_id, claims.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn archive(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Chat>> {
    let chat = state.chat.lifecycle().archive(chat_id, claims.user_id()).await?;
    Ok(Json(chat))
}

pub async fn unarchive(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Chat>> {
    let chat = state.chat.lifecycle().unarchive(chat_id, claims.user_id()).await?;
    Ok(Json(chat))
}

pub async fn toggle_mute(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MuteResponse>> {
    let muted = state
        .chat
        .lifecycle()
        .toggle_mute(chat_id, claims.user_id())
        .await?;
    Ok(Json(MuteResponse { muted }))
}

pub async fn report(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportRequest>,
) -> ApiResult<StatusCode> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("a report needs a reason".into()));
    }
    state
        .chat
        .lifecycle()
        .report(chat_id, claims.user_id(), &req.reason)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn share(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    state.chat.lifecycle().share(chat_id, claims.user_id()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn block_user(
    State(state): State<AppState>,
    Path(target): Path<UserId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    if target == claims.user_id() {
        return Err(ApiError::BadRequest("cannot block yourself".into()));
    }
    state.chat.lifecycle().block(claims.user_id(), target).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn live_listing(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Listing>> {
    let listing = state
        .chat
        .registry()
        .live_listing(chat_id, claims.user_id())
        .await?;
    Ok(Json(listing))
}

pub async fn suggestions(Extension(_claims): Extension<Claims>) -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        suggestions: message_suggestions(),
    })
}
