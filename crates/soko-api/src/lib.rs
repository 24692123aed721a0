pub mod attachments;
pub mod chats;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};

/// Body allowance on top of the attachment ceiling so that slightly
/// oversized uploads reach validation and get a descriptive 400.
const UPLOAD_BODY_SLACK: usize = 64 * 1024;

/// REST routes behind the bearer-token middleware, plus the WebSocket gateway
/// which authenticates through its `token` query parameter.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_attachment_bytes + UPLOAD_BODY_SLACK;

    let protected_routes = Router::new()
        .route("/chats", post(chats::open_chat).get(chats::list_chats))
        .route("/chats/{chat_id}", get(chats::get_chat).delete(chats::delete_chat))
        .route("/chats/{chat_id}/archive", post(chats::archive))
        .route("/chats/{chat_id}/unarchive", post(chats::unarchive))
        .route("/chats/{chat_id}/mute", post(chats::toggle_mute))
        .route("/chats/{chat_id}/report", post(chats::report))
        .route("/chats/{chat_id}/share", post(chats::share))
        .route("/chats/{chat_id}/listing", get(chats::live_listing))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/chats/{chat_id}/attachments",
            post(attachments::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/users/{user_id}/block", post(chats::block_user))
        .route("/suggestions", get(chats::suggestions))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(state);

    Router::new().merge(protected_routes).merge(ws_route)
}
