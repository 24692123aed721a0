use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use bytes::Bytes;

use soko_types::ChatId;
use soko_types::api::{Claims, UploadQuery, UploadResponse};

use crate::error::ApiResult;
use crate::state::AppState;

/// Raw image bytes in the body; the name only feeds the stored file name.
pub async fn upload(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<UploadQuery>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let uploaded = state
        .chat
        .attachments()
        .upload_attachment(chat_id, claims.user_id(), body, &query.file_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: uploaded.url,
            size: uploaded.size as u64,
            sha256: uploaded.sha256,
        }),
    ))
}
