use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use soko_chat::ChatError;
use soko_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Chat(e) => match e {
                ChatError::InvalidParticipants
                | ChatError::InvalidMessage(_)
                | ChatError::InvalidFile(_) => StatusCode::BAD_REQUEST,
                ChatError::NotAParticipant { .. } => StatusCode::FORBIDDEN,
                ChatError::NotFound(_) => StatusCode::NOT_FOUND,
                ChatError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
                ChatError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Collaborator details stay in the log
            Self::Chat(ChatError::BackendUnavailable(e)) => {
                error!("Backend failure: {:#}", e);
                "backend unavailable, try again later".to_string()
            }
            other => {
                debug!("Request rejected ({}): {}", status, other);
                other.to_string()
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
