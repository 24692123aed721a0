use thiserror::Error;

use soko_types::{ChatId, UserId};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("a user cannot open a chat with themself about their own listing")]
    InvalidParticipants,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("user {user_id} is not a participant of chat {chat_id}")]
    NotAParticipant { chat_id: ChatId, user_id: UserId },

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is not implemented yet")]
    NotImplemented(&'static str),

    #[error("backend unavailable: {0:#}")]
    BackendUnavailable(#[from] anyhow::Error),
}

impl ChatError {
    /// Only collaborator failures are transient; everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    pub(crate) fn chat_not_found(chat_id: ChatId) -> Self {
        Self::NotFound(format!("chat {}", chat_id))
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
