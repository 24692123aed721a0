use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};

use soko_db::Store;
use soko_types::events::ChatEvent;
use soko_types::models::{Chat, MemberState};
use soko_types::{ChatId, UserId};

use crate::backend::{blocking, load_chat_for};
use crate::dispatcher::Dispatcher;
use crate::error::{ChatError, ChatResult};

/// Per-participant archive and mute flags, plus chat deletion.
///
/// Archiving and muting only change the acting participant's view; the
/// counterpart keeps seeing the chat as before.
#[derive(Clone)]
pub struct ChatStateMachine {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
}

impl ChatStateMachine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn archive(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<Chat> {
        self.update_member(chat_id, user_id, |state| {
            if !state.archived {
                state.archived = true;
                state.archived_at = Some(Utc::now().trunc_subsecs(6));
            }
        })
        .await
    }

    pub async fn unarchive(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<Chat> {
        self.update_member(chat_id, user_id, |state| {
            state.archived = false;
            state.archived_at = None;
        })
        .await
    }

    /// Flips the mute flag and returns the new value.
    pub async fn toggle_mute(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<bool> {
        let chat = self
            .update_member(chat_id, user_id, |state| state.muted = !state.muted)
            .await?;
        Ok(chat.is_muted_for(user_id))
    }

    /// Removes the chat and every message in it. Deleting a chat that is
    /// already gone succeeds.
    pub async fn delete(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<()> {
        let Some(chat) = blocking(&self.store, move |s| s.get_chat(chat_id)).await? else {
            debug!("Chat {} already deleted", chat_id);
            return Ok(());
        };
        if !chat.has_participant(user_id) {
            return Err(ChatError::NotAParticipant { chat_id, user_id });
        }

        // Messages first, so a failure part-way leaves a chat that can be
        // deleted again rather than messages without a chat.
        let ids = blocking(&self.store, move |s| s.message_ids(chat_id)).await?;
        let total = ids.len();
        for message_id in ids {
            let removed =
                blocking(&self.store, move |s| s.delete_message(chat_id, message_id)).await?;
            if !removed {
                warn!("Message {} of chat {} vanished during delete", message_id, chat_id);
            }
        }

        blocking(&self.store, move |s| s.delete_chat(chat_id)).await?;
        info!("Chat {} deleted by {} ({} messages)", chat_id, user_id, total);

        self.dispatcher.publish(ChatEvent::ChatDeleted {
            chat_id,
            participants: chat.participants,
        });
        Ok(())
    }

    pub async fn report(&self, chat_id: ChatId, user_id: UserId, reason: &str) -> ChatResult<()> {
        debug!("Report of chat {} by {} rejected: {}", chat_id, user_id, reason);
        Err(ChatError::NotImplemented("reporting chats"))
    }

    pub async fn block(&self, user_id: UserId, target: UserId) -> ChatResult<()> {
        debug!("Block of {} by {} rejected", target, user_id);
        Err(ChatError::NotImplemented("blocking users"))
    }

    pub async fn share(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<()> {
        debug!("Share of chat {} by {} rejected", chat_id, user_id);
        Err(ChatError::NotImplemented("sharing chats"))
    }

    async fn update_member<F>(&self, chat_id: ChatId, user_id: UserId, change: F) -> ChatResult<Chat>
    where
        F: FnOnce(&mut MemberState),
    {
        let mut chat = load_chat_for(&self.store, chat_id, user_id).await?;

        let mut state = chat.member(user_id);
        change(&mut state);

        let stored = state.clone();
        let updated = blocking(&self.store, move |s| {
            s.update_member(chat_id, user_id, &stored)
        })
        .await?;
        if !updated {
            return Err(ChatError::chat_not_found(chat_id));
        }

        chat.members.insert(user_id, state);
        self.dispatcher.publish(ChatEvent::ChatUpserted {
            chat_id,
            participants: chat.participants,
        });
        Ok(chat)
    }
}
