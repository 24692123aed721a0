use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, info};

use soko_db::Store;
use soko_types::events::ChatEvent;
use soko_types::models::{Chat, Listing, ListingSnapshot};
use soko_types::{ChatId, ListingId, UserId};

use crate::backend::{blocking, load_chat_for};
use crate::dispatcher::Dispatcher;
use crate::error::{ChatError, ChatResult};
use crate::retry::ReadRetry;
use crate::subscription::{Refresh, Subscription, spawn_watch};

/// Owns chat creation and per-user chat lists.
#[derive(Clone)]
pub struct ChatRegistry {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    retry: ReadRetry,
    buffer: usize,
}

impl ChatRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Dispatcher,
        retry: ReadRetry,
        buffer: usize,
    ) -> Self {
        Self {
            store,
            dispatcher,
            retry,
            buffer,
        }
    }

    /// Returns the chat between `viewer` and `owner` about `listing_id`,
    /// creating it with a listing snapshot if none exists yet.
    ///
    /// Concurrent calls for the same pair and listing converge on one chat:
    /// the store keeps the first insert and hands it back to the loser.
    pub async fn open_or_create_chat(
        &self,
        viewer: UserId,
        listing_id: ListingId,
        owner: UserId,
    ) -> ChatResult<Chat> {
        if viewer == owner {
            return Err(ChatError::InvalidParticipants);
        }

        let existing = self
            .retry
            .run("find chat", || {
                blocking(&self.store, move |s| s.find_chat(viewer, listing_id))
            })
            .await?;
        if let Some(chat) = existing.filter(|c| c.has_participant(owner)) {
            debug!("Reusing chat {} for listing {}", chat.id, listing_id);
            return Ok(chat);
        }

        let listing = self.fetch_listing(listing_id).await?;
        if listing.owner_id != owner {
            return Err(ChatError::InvalidParticipants);
        }

        let chat = Chat::new(
            viewer,
            owner,
            listing_id,
            ListingSnapshot::capture(&listing),
            Utc::now().trunc_subsecs(6),
        );
        let candidate = chat.id;
        let stored = blocking(&self.store, move |s| s.create_chat(&chat)).await?;

        if stored.id == candidate {
            info!(
                "Created chat {} between {} and {} for listing {}",
                stored.id, viewer, owner, listing_id
            );
            self.dispatcher.publish(ChatEvent::ChatUpserted {
                chat_id: stored.id,
                participants: stored.participants,
            });
        } else {
            debug!("Chat for listing {} was created concurrently", listing_id);
        }

        Ok(stored)
    }

    pub async fn get_chat(&self, chat_id: ChatId, viewer: UserId) -> ChatResult<Chat> {
        self.retry
            .run("get chat", || load_chat_for(&self.store, chat_id, viewer))
            .await
    }

    /// Chats of `user_id` that they have not archived, newest activity first.
    pub async fn list_chats_for_user(&self, user_id: UserId) -> ChatResult<Vec<Chat>> {
        let mut chats = self.all_chats(user_id).await?;
        chats.retain(|c| !c.is_archived_for(user_id));
        Ok(chats)
    }

    /// Chats `user_id` archived, newest activity first.
    pub async fn list_archived_chats(&self, user_id: UserId) -> ChatResult<Vec<Chat>> {
        let mut chats = self.all_chats(user_id).await?;
        chats.retain(|c| c.is_archived_for(user_id));
        Ok(chats)
    }

    /// Live version of [`list_chats_for_user`](Self::list_chats_for_user).
    pub async fn watch_chats(&self, user_id: UserId) -> ChatResult<Subscription<Vec<Chat>>> {
        // Subscribe before the first read so no change slips between the two.
        let events = self.dispatcher.subscribe();
        let initial = self.list_chats_for_user(user_id).await?;

        let registry = self.clone();
        Ok(spawn_watch(
            format!("chats of {}", user_id),
            initial,
            self.buffer,
            events,
            move |event| event.involves(user_id),
            move |_| {
                let registry = registry.clone();
                async move {
                    registry
                        .list_chats_for_user(user_id)
                        .await
                        .map(Refresh::Emit)
                }
            },
        ))
    }

    /// Current listing data behind a chat, as opposed to its creation snapshot.
    pub async fn live_listing(&self, chat_id: ChatId, viewer: UserId) -> ChatResult<Listing> {
        let chat = self.get_chat(chat_id, viewer).await?;
        self.fetch_listing(chat.listing_id).await
    }

    async fn fetch_listing(&self, listing_id: ListingId) -> ChatResult<Listing> {
        self.retry
            .run("get listing", || {
                blocking(&self.store, move |s| s.get_listing(listing_id))
            })
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("listing {}", listing_id)))
    }

    async fn all_chats(&self, user_id: UserId) -> ChatResult<Vec<Chat>> {
        let mut chats = self
            .retry
            .run("list chats", || {
                blocking(&self.store, move |s| s.chats_for_user(user_id))
            })
            .await?;
        chats.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
        Ok(chats)
    }
}
