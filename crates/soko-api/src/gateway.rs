//! WebSocket gateway: live chat lists, live message lists and user notices.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use soko_chat::{ChatError, ChatResult, ChatService, Subscription};
use soko_types::events::{GatewayCommand, GatewayFrame};
use soko_types::models::Message as ChatMessage;
use soko_types::{ChatId, UserId};

use crate::middleware::decode_token;
use crate::state::AppState;

/// Server sends a Ping this often; two missed Pongs drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const FRAME_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// The JWT is validated before upgrading; browsers cannot set headers on
/// WebSocket requests, hence the query parameter.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = decode_token(&state.jwt_secret, &query.token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let chat = state.chat.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, chat, claims.user_id()))
}

/// Live watches owned by one connection. Dropping it cancels all of them.
#[derive(Default)]
struct Watches {
    chats: HashMap<ChatId, JoinHandle<()>>,
    chat_list: Option<JoinHandle<()>>,
}

impl Watches {
    /// Forgets watches whose stream has already ended.
    fn prune(&mut self) {
        self.chats.retain(|_, task| !task.is_finished());
        if self.chat_list.as_ref().is_some_and(JoinHandle::is_finished) {
            self.chat_list = None;
        }
    }

    fn watch_chat(&mut self, chat_id: ChatId, task: JoinHandle<()>) {
        if let Some(old) = self.chats.insert(chat_id, task) {
            old.abort();
        }
    }

    fn unwatch_chat(&mut self, chat_id: ChatId) -> bool {
        match self.chats.remove(&chat_id) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn watch_chat_list(&mut self, task: JoinHandle<()>) {
        if let Some(old) = self.chat_list.replace(task) {
            old.abort();
        }
    }
}

impl Drop for Watches {
    fn drop(&mut self) {
        for task in self.chats.values() {
            task.abort();
        }
        if let Some(task) = &self.chat_list {
            task.abort();
        }
    }
}

async fn handle_connection(socket: WebSocket, chat: ChatService, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    info!("{} connected to gateway", user_id);

    if !send_frame(&mut sender, &GatewayFrame::Ready { user_id }).await {
        return;
    }

    let dispatcher = chat.dispatcher().clone();
    let (conn_id, mut notices) = dispatcher.register_user_channel(user_id).await;
    dispatcher.user_online(user_id).await;

    let (frames_tx, mut frames_rx) = mpsc::channel::<GatewayFrame>(FRAME_BUFFER);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Snapshots, notices and heartbeats -> client
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = frames_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if !send_frame(&mut sender, &frame).await {
                        break;
                    }
                }
                notice = notices.recv() => {
                    let Some(notice) = notice else { break };
                    if !send_frame(&mut sender, &GatewayFrame::Notice(notice)).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout for {}, dropping connection", user_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Commands from client
    let recv_chat = chat.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut watches = Watches::default();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => {
                        handle_command(&recv_chat, user_id, cmd, &mut watches, &frames_tx).await;
                    }
                    Err(e) => {
                        warn!("{} sent a bad command: {}", user_id, e);
                        let frame = GatewayFrame::Error {
                            message: format!("unrecognized command: {}", e),
                        };
                        if frames_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn handle_command(
    chat: &ChatService,
    user_id: UserId,
    cmd: GatewayCommand,
    watches: &mut Watches,
    frames: &mpsc::Sender<GatewayFrame>,
) {
    watches.prune();

    let result = match cmd {
        GatewayCommand::WatchChat { chat_id } => {
            debug!("{} watching chat {}", user_id, chat_id);
            match watch_chat(chat, user_id, chat_id).await {
                Ok(sub) => {
                    let label = format!("watch of chat {}", chat_id);
                    let task = forward(sub, frames.clone(), label, move |messages| {
                        GatewayFrame::Messages { chat_id, messages }
                    });
                    watches.watch_chat(chat_id, task);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }

        GatewayCommand::UnwatchChat { chat_id } => {
            if watches.unwatch_chat(chat_id) {
                debug!("{} stopped watching chat {}", user_id, chat_id);
            }
            Ok(())
        }

        GatewayCommand::WatchChats => match chat.registry().watch_chats(user_id).await {
            Ok(sub) => {
                let task = forward(sub, frames.clone(), "chat list watch".into(), |chats| {
                    GatewayFrame::Chats { chats }
                });
                watches.watch_chat_list(task);
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        let _ = frames
            .send(GatewayFrame::Error {
                message: client_message(&e),
            })
            .await;
    }
}

async fn watch_chat(
    chat: &ChatService,
    user_id: UserId,
    chat_id: ChatId,
) -> ChatResult<Subscription<Vec<ChatMessage>>> {
    chat.registry().get_chat(chat_id, user_id).await?;
    chat.messages().subscribe(chat_id).await
}

/// Pumps a subscription into the connection's frame queue until either side
/// ends. A stream that died on a store failure is reported with an `Error` frame.
fn forward<T, F>(
    mut sub: Subscription<T>,
    frames: mpsc::Sender<GatewayFrame>,
    label: String,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> GatewayFrame + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(snapshot) = sub.recv().await {
            if frames.send(wrap(snapshot)).await.is_err() {
                return;
            }
        }

        if let Some(e) = sub.take_failure() {
            warn!("{} ended: {}", label, e);
            let _ = frames
                .send(GatewayFrame::Error {
                    message: format!("{} ended: {}", label, client_message(&e)),
                })
                .await;
        }
    })
}

/// Store failures are logged server side; clients only learn to retry.
fn client_message(e: &ChatError) -> String {
    if e.is_retryable() {
        "service temporarily unavailable, try again".to_string()
    } else {
        e.to_string()
    }
}

/// Returns false once the socket is gone.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &GatewayFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway frame: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
