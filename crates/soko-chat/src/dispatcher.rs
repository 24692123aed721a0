use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use soko_types::UserId;
use soko_types::events::{ChatEvent, UserNotice};

const EVENT_CAPACITY: usize = 1024;

/// Fans chat changes out to live subscriptions and routes per-user notices
/// to whichever gateway connection currently owns the user.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every subscription task listens here and filters by chat or user.
    events_tx: broadcast::Sender<ChatEvent>,

    online_users: RwLock<HashSet<UserId>>,

    /// user_id -> (conn_id, sender). Newest connection wins.
    user_channels: RwLock<HashMap<UserId, (Uuid, mpsc::UnboundedSender<UserNotice>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                events_tx,
                online_users: RwLock::new(HashSet::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Live subscriptions currently listening for events.
    pub fn watcher_count(&self) -> usize {
        self.inner.events_tx.receiver_count()
    }

    /// No receivers is not an error: nobody is watching.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    pub async fn register_user_channel(
        &self,
        user_id: UserId,
    ) -> (Uuid, mpsc::UnboundedReceiver<UserNotice>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Only removes the channel if `conn_id` still owns it.
    pub async fn unregister_user_channel(&self, user_id: UserId, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id) {
            channels.remove(&user_id);
        }
    }

    /// Returns whether the notice reached a live connection.
    pub async fn send_to_user(&self, user_id: UserId, notice: UserNotice) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(notice).is_ok(),
            None => false,
        }
    }

    pub async fn user_online(&self, user_id: UserId) {
        let newly_online = self.inner.online_users.write().await.insert(user_id);
        if newly_online {
            self.announce_presence(user_id, true).await;
        }
    }

    pub async fn user_offline(&self, user_id: UserId, conn_id: Uuid) {
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection took over
            return;
        }

        self.unregister_user_channel(user_id, conn_id).await;
        self.inner.online_users.write().await.remove(&user_id);
        self.announce_presence(user_id, false).await;
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.online_users.read().await.contains(&user_id)
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.online_users.read().await.iter().copied().collect()
    }

    async fn announce_presence(&self, user_id: UserId, online: bool) {
        let channels = self.inner.user_channels.read().await;
        for (uid, (_, tx)) in channels.iter() {
            if *uid != user_id {
                let _ = tx.send(UserNotice::PresenceUpdate { user_id, online });
            }
        }
    }
}
