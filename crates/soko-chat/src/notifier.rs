use tracing::debug;

use soko_types::events::UserNotice;
use soko_types::models::{Chat, Message};

use crate::dispatcher::Dispatcher;

/// Sends new-message notices to the participant who did not write the message.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Returns whether a notice was delivered. Muted chats never notify.
    pub async fn message_appended(&self, chat: &Chat, message: &Message) -> bool {
        let Some(recipient) = chat.counterpart(message.sender_id) else {
            return false;
        };

        if chat.is_muted_for(recipient) {
            debug!("Chat {} is muted for {}, skipping notice", chat.id, recipient);
            return false;
        }

        let notice = UserNotice::NewMessage {
            chat_id: chat.id,
            message_id: message.id,
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            preview: message.preview(),
        };
        self.dispatcher.send_to_user(recipient, notice).await
    }
}
