use std::sync::Arc;

use soko_chat::ChatService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub jwt_secret: String,
    pub max_attachment_bytes: usize,
}
