use std::sync::Arc;

use tracing::{debug, info};

use soko_db::{MessageDraft, Store};
use soko_types::events::ChatEvent;
use soko_types::models::{ANONYMOUS_SENDER, Message, MessageCursor, NewMessage};
use soko_types::{ChatId, MessageId, UserId};

use crate::backend::{blocking, load_chat, load_chat_for};
use crate::dispatcher::Dispatcher;
use crate::error::{ChatError, ChatResult};
use crate::notifier::Notifier;
use crate::retry::ReadRetry;
use crate::subscription::{Refresh, Subscription, spawn_watch};

/// Ordered, append-only message log of each chat.
#[derive(Clone)]
pub struct MessageStream {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    notifier: Notifier,
    retry: ReadRetry,
    buffer: usize,
}

impl MessageStream {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Dispatcher,
        notifier: Notifier,
        retry: ReadRetry,
        buffer: usize,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            retry,
            buffer,
        }
    }

    /// Appends a message stamped with the server clock.
    ///
    /// Never retried: a failure is reported so the sender can decide whether
    /// to send again.
    pub async fn append_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        sender_name: Option<String>,
        message: NewMessage,
    ) -> ChatResult<Message> {
        let text = message.normalized_text().map(str::to_string);
        let image_url = message.normalized_image_url().map(str::to_string);
        if text.is_none() && image_url.is_none() {
            return Err(ChatError::InvalidMessage(
                "a message needs text or an image".into(),
            ));
        }

        let chat = load_chat_for(&self.store, chat_id, sender_id).await?;

        let draft = MessageDraft {
            id: MessageId::new_v4(),
            chat_id,
            sender_id,
            sender_name: Some(
                sender_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| ANONYMOUS_SENDER.to_string()),
            ),
            text: text.unwrap_or_default(),
            image_url,
            payload: message.payload,
        };

        let stored = blocking(&self.store, move |s| s.append_message(&draft))
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))?;

        debug!("Message {} appended to chat {}", stored.id, chat_id);

        self.dispatcher.publish(ChatEvent::MessageCreated {
            chat_id,
            message_id: stored.id,
            participants: chat.participants,
        });
        self.notifier.message_appended(&chat, &stored).await;

        Ok(stored)
    }

    pub async fn price_quote(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        sender_name: Option<String>,
        price: i64,
    ) -> ChatResult<Message> {
        if price < 0 {
            return Err(ChatError::InvalidMessage("price cannot be negative".into()));
        }
        self.append_message(chat_id, sender_id, sender_name, NewMessage::price_quote(price))
            .await
    }

    pub async fn meeting_point(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        sender_name: Option<String>,
        location: &str,
    ) -> ChatResult<Message> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ChatError::InvalidMessage("meeting location is empty".into()));
        }
        self.append_message(
            chat_id,
            sender_id,
            sender_name,
            NewMessage::meeting_point(location),
        )
        .await
    }

    /// Every message of the chat, oldest first.
    pub async fn fetch_all(&self, chat_id: ChatId) -> ChatResult<Vec<Message>> {
        self.retry
            .run("fetch messages", || async {
                load_chat(&self.store, chat_id).await?;
                blocking(&self.store, move |s| s.list_messages(chat_id)).await
            })
            .await
    }

    /// Messages ordered after `after`, oldest first. Pass the last message
    /// already held (`Message::cursor`) to resume without gaps.
    pub async fn fetch_since(
        &self,
        chat_id: ChatId,
        after: MessageCursor,
    ) -> ChatResult<Vec<Message>> {
        self.retry
            .run("fetch new messages", || async {
                load_chat(&self.store, chat_id).await?;
                blocking(&self.store, move |s| s.list_messages_since(chat_id, after)).await
            })
            .await
    }

    /// Live ordered message list. Ends with an empty snapshot once the chat is deleted.
    pub async fn subscribe(&self, chat_id: ChatId) -> ChatResult<Subscription<Vec<Message>>> {
        let events = self.dispatcher.subscribe();
        let initial = self.fetch_all(chat_id).await?;
        info!("Subscribed to messages of chat {}", chat_id);

        let stream = self.clone();
        Ok(spawn_watch(
            format!("messages of {}", chat_id),
            initial,
            self.buffer,
            events,
            move |event| {
                event.chat_id() == chat_id
                    && matches!(
                        event,
                        ChatEvent::MessageCreated { .. } | ChatEvent::ChatDeleted { .. }
                    )
            },
            move |trigger| {
                let stream = stream.clone();
                async move {
                    if matches!(trigger, Some(ChatEvent::ChatDeleted { .. })) {
                        return Ok(Refresh::Finish(Vec::new()));
                    }
                    match stream.fetch_all(chat_id).await {
                        Ok(messages) => Ok(Refresh::Emit(messages)),
                        Err(ChatError::NotFound(_)) => Ok(Refresh::Finish(Vec::new())),
                        Err(e) => Err(e),
                    }
                }
            },
        ))
    }
}
