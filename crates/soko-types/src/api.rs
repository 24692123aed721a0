use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{ListingId, UserId};
use crate::models::MessageCursor;

// -- Identity --

/// Bearer token claims issued by the identity provider. Shared by the REST
/// middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId(self.sub)
    }
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenChatRequest {
    pub listing_id: ListingId,
    pub owner_id: UserId,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListChatsQuery {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MuteResponse {
    pub muted: bool,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Only return messages after this instant.
    pub since: Option<DateTime<Utc>>,
    /// `seq` of the last message the client holds. Together with `since`
    /// it resumes exactly after that message, ties included.
    pub after_seq: Option<i64>,
}

impl MessagesQuery {
    pub fn cursor(&self) -> Option<MessageCursor> {
        let timestamp = self.since?;
        Some(match self.after_seq {
            Some(seq) => MessageCursor { timestamp, seq },
            None => MessageCursor::after_time(timestamp),
        })
    }
}

// -- Attachments --

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
