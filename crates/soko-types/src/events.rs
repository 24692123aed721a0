use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MessageId, UserId};
use crate::models::{Chat, Message};

/// Change notifications fanned out to live subscriptions after a write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A chat was created or one of its fields changed.
    ChatUpserted {
        chat_id: ChatId,
        participants: [UserId; 2],
    },

    /// A message was appended to a chat.
    MessageCreated {
        chat_id: ChatId,
        message_id: MessageId,
        participants: [UserId; 2],
    },

    /// A chat and all of its messages were removed.
    ChatDeleted {
        chat_id: ChatId,
        participants: [UserId; 2],
    },
}

impl ChatEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::ChatUpserted { chat_id, .. }
            | Self::MessageCreated { chat_id, .. }
            | Self::ChatDeleted { chat_id, .. } => *chat_id,
        }
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        match self {
            Self::ChatUpserted { participants, .. }
            | Self::MessageCreated { participants, .. }
            | Self::ChatDeleted { participants, .. } => participants.contains(&user_id),
        }
    }
}

/// Events targeted at one user, independent of any subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserNotice {
    /// Someone wrote in a chat the user has not muted.
    NewMessage {
        chat_id: ChatId,
        message_id: MessageId,
        sender_id: UserId,
        sender_name: Option<String>,
        preview: String,
    },

    /// A user came online or went offline.
    PresenceUpdate { user_id: UserId, online: bool },
}

/// Frames sent from the server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayFrame {
    Ready { user_id: UserId },

    /// Full ordered message list of a watched chat.
    Messages {
        chat_id: ChatId,
        messages: Vec<Message>,
    },

    /// Full ordered chat list of the connected user.
    Chats { chats: Vec<Chat> },

    Notice(UserNotice),

    Error { message: String },
}

/// Commands sent from the client over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start streaming message snapshots for a chat.
    WatchChat { chat_id: ChatId },

    /// Stop streaming a chat. Releases the server-side watch.
    UnwatchChat { chat_id: ChatId },

    /// Start streaming the user's chat list.
    WatchChats,
}
