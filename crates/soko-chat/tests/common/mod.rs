#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use soko_chat::{ChatConfig, ChatService, DiskBlobStore, ReadRetry};
use soko_db::{ChatStore, Database, ListingDirectory, MessageDraft, MessageStore, Store};
use soko_types::models::{Chat, Listing, MemberState, Message, MessageCursor};
use soko_types::{ChatId, ListingId, MessageId, UserId};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub struct Harness {
    pub service: ChatService,
    pub db: Arc<Database>,
    pub dir: TempDir,
}

pub fn fast_config() -> ChatConfig {
    ChatConfig {
        read_retry: ReadRetry {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..ChatConfig::default()
    }
}

pub async fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    harness_with(db.clone(), db).await
}

pub async fn harness_with(db: Arc<Database>, store: Arc<dyn Store>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let blobs = DiskBlobStore::new(dir.path().join("blobs"), "http://soko.test")
        .await
        .unwrap();
    let service = ChatService::new(store, Arc::new(blobs), fast_config());
    Harness { service, db, dir }
}

impl Harness {
    pub fn listing(&self, owner: UserId, title: Option<&str>, price: Option<i64>) -> Listing {
        let listing = Listing {
            id: ListingId::new_v4(),
            owner_id: owner,
            title: title.map(str::to_string),
            price,
            images: vec!["http://soko.test/files/listings/1.jpg".to_string()],
        };
        self.db.upsert_listing(&listing).unwrap();
        listing
    }

    /// A buyer, a seller and a chat between them about a fresh listing.
    pub async fn chat(&self) -> (UserId, UserId, Chat) {
        let buyer = UserId::new_v4();
        let seller = UserId::new_v4();
        let listing = self.listing(seller, Some("Bicycle"), Some(45_000));
        let chat = self
            .service
            .registry()
            .open_or_create_chat(buyer, listing.id, seller)
            .await
            .unwrap();
        (buyer, seller, chat)
    }
}

/// Wraps a database and fails a configurable number of calls.
pub struct FlakyStore {
    inner: Arc<Database>,
    read_failures: AtomicU32,
    fail_appends: AtomicBool,
    pub get_chat_calls: AtomicU32,
    pub append_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            read_failures: AtomicU32::new(0),
            fail_appends: AtomicBool::new(false),
            get_chat_calls: AtomicU32::new(0),
            append_calls: AtomicU32::new(0),
        }
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    fn read_gate(&self) -> Result<()> {
        let left = self.read_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.read_failures.store(left - 1, Ordering::SeqCst);
            return Err(anyhow!("simulated read timeout"));
        }
        Ok(())
    }
}

impl ChatStore for FlakyStore {
    fn create_chat(&self, chat: &Chat) -> Result<Chat> {
        self.inner.create_chat(chat)
    }

    fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>> {
        self.get_chat_calls.fetch_add(1, Ordering::SeqCst);
        self.read_gate()?;
        self.inner.get_chat(chat_id)
    }

    fn find_chat(&self, participant: UserId, listing_id: ListingId) -> Result<Option<Chat>> {
        self.read_gate()?;
        self.inner.find_chat(participant, listing_id)
    }

    fn chats_for_user(&self, user_id: UserId) -> Result<Vec<Chat>> {
        self.read_gate()?;
        self.inner.chats_for_user(user_id)
    }

    fn update_member(&self, chat_id: ChatId, user_id: UserId, state: &MemberState) -> Result<bool> {
        self.inner.update_member(chat_id, user_id, state)
    }

    fn delete_chat(&self, chat_id: ChatId) -> Result<bool> {
        self.inner.delete_chat(chat_id)
    }
}

impl MessageStore for FlakyStore {
    fn append_message(&self, draft: &MessageDraft) -> Result<Option<Message>> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated write timeout"));
        }
        self.inner.append_message(draft)
    }

    fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        self.read_gate()?;
        self.inner.list_messages(chat_id)
    }

    fn list_messages_since(&self, chat_id: ChatId, after: MessageCursor) -> Result<Vec<Message>> {
        self.read_gate()?;
        self.inner.list_messages_since(chat_id, after)
    }

    fn message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>> {
        self.inner.message_ids(chat_id)
    }

    fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool> {
        self.inner.delete_message(chat_id, message_id)
    }
}

impl ListingDirectory for FlakyStore {
    fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        self.inner.get_listing(listing_id)
    }
}
