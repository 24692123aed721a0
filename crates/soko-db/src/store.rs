//! Collaborator contracts consumed by the chat service.
//!
//! Every method is a single atomic unit of work against the backing store.
//! Implementations must be safe to call from several threads at once.

use anyhow::Result;

use soko_types::models::{Chat, Listing, MemberState, Message, MessageCursor, StructuredPayload};
use soko_types::{ChatId, ListingId, MessageId, UserId};

/// A validated message waiting for its server timestamp and sequence number.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    pub text: String,
    pub image_url: Option<String>,
    pub payload: Option<StructuredPayload>,
}

pub trait ChatStore: Send + Sync {
    /// Persists `chat` unless a chat for the same unordered participant pair
    /// and listing already exists. Returns whichever chat is stored.
    fn create_chat(&self, chat: &Chat) -> Result<Chat>;

    fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>>;

    /// The chat about `listing_id` that `participant` takes part in.
    fn find_chat(&self, participant: UserId, listing_id: ListingId) -> Result<Option<Chat>>;

    /// Every chat of `user_id`, newest activity first.
    fn chats_for_user(&self, user_id: UserId) -> Result<Vec<Chat>>;

    /// Overwrites one participant's flags. Returns false if there is no such member.
    fn update_member(&self, chat_id: ChatId, user_id: UserId, state: &MemberState)
    -> Result<bool>;

    /// Removes the chat document. Returns false if it was already gone.
    fn delete_chat(&self, chat_id: ChatId) -> Result<bool>;
}

pub trait MessageStore: Send + Sync {
    /// Stores the message and points the chat's `last_message` at it in one
    /// transaction. The timestamp is the server clock, raised if needed so it
    /// never falls behind the chat's newest message. `None` if the chat is gone.
    fn append_message(&self, draft: &MessageDraft) -> Result<Option<Message>>;

    /// Messages of a chat ordered by `(timestamp, seq)`.
    fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>>;

    /// Same ordering as `list_messages`, restricted to messages ordered after `after`.
    fn list_messages_since(&self, chat_id: ChatId, after: MessageCursor) -> Result<Vec<Message>>;

    fn message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>>;

    /// Returns false if the message was already gone.
    fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool>;
}

/// Read access to the marketplace's listings.
pub trait ListingDirectory: Send + Sync {
    fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>>;
}

pub trait Store: ChatStore + MessageStore + ListingDirectory {}

impl<T> Store for T where T: ChatStore + MessageStore + ListingDirectory {}
