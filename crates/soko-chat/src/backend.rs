use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use soko_db::Store;
use soko_types::models::Chat;
use soko_types::{ChatId, UserId};

use crate::error::{ChatError, ChatResult};

/// Runs a synchronous store call on the blocking pool.
pub(crate) async fn blocking<T, F>(store: &Arc<dyn Store>, f: F) -> ChatResult<T>
where
    F: FnOnce(&dyn Store) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| {
            error!("store task failed: {}", e);
            ChatError::BackendUnavailable(anyhow!("store task failed: {}", e))
        })?
        .map_err(ChatError::BackendUnavailable)
}

pub(crate) async fn load_chat(store: &Arc<dyn Store>, chat_id: ChatId) -> ChatResult<Chat> {
    blocking(store, move |s| s.get_chat(chat_id))
        .await?
        .ok_or_else(|| ChatError::chat_not_found(chat_id))
}

/// Loads a chat and checks that `user_id` takes part in it.
pub(crate) async fn load_chat_for(
    store: &Arc<dyn Store>,
    chat_id: ChatId,
    user_id: UserId,
) -> ChatResult<Chat> {
    let chat = load_chat(store, chat_id).await?;
    if !chat.has_participant(user_id) {
        return Err(ChatError::NotAParticipant { chat_id, user_id });
    }
    Ok(chat)
}
