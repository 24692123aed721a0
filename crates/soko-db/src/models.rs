//! Database row types. These map directly to SQLite rows and are converted
//! into `soko-types` models at the store boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use std::collections::BTreeMap;

use soko_types::models::{
    Chat, LastMessage, Listing, ListingSnapshot, MemberState, Message, StructuredPayload,
};
use soko_types::{ChatId, ListingId, MessageId, UserId};

pub struct ListingRow {
    pub id: String,
    pub owner_id: String,
    pub title: Option<String>,
    pub price: Option<i64>,
    pub images: String,
}

pub struct ChatRow {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub listing_id: String,
    pub listing_name: String,
    pub listing_price: i64,
    pub listing_image: Option<String>,
    pub created_at: String,
    pub last_text: Option<String>,
    pub last_sender_id: Option<String>,
    pub last_has_image: bool,
    pub last_at: Option<String>,
}

pub struct MemberRow {
    pub chat_id: String,
    pub user_id: String,
    pub archived: bool,
    pub archived_at: Option<String>,
    pub muted: bool,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub text: String,
    pub image_url: Option<String>,
    pub payload: Option<String>,
    pub created_at: String,
}

pub const CHAT_COLUMNS: &str = "id, buyer_id, seller_id, listing_id, listing_name, listing_price, \
     listing_image, created_at, last_text, last_sender_id, last_has_image, last_at";

pub const MESSAGE_COLUMNS: &str =
    "seq, id, chat_id, sender_id, sender_name, text, image_url, payload, created_at";

impl ListingRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            price: row.get(3)?,
            images: row.get(4)?,
        })
    }

    pub fn into_model(self) -> Result<Listing> {
        let images: Vec<String> = serde_json::from_str(&self.images)
            .with_context(|| format!("corrupt images column on listing {}", self.id))?;
        Ok(Listing {
            id: ListingId::parse(&self.id)?,
            owner_id: UserId::parse(&self.owner_id)?,
            title: self.title,
            price: self.price,
            images,
        })
    }
}

impl ChatRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            buyer_id: row.get(1)?,
            seller_id: row.get(2)?,
            listing_id: row.get(3)?,
            listing_name: row.get(4)?,
            listing_price: row.get(5)?,
            listing_image: row.get(6)?,
            created_at: row.get(7)?,
            last_text: row.get(8)?,
            last_sender_id: row.get(9)?,
            last_has_image: row.get(10)?,
            last_at: row.get(11)?,
        })
    }

    /// Builds the model; `members` holds every member row for this chat.
    pub fn into_model(self, members: Vec<MemberRow>) -> Result<Chat> {
        let last_message = match (self.last_sender_id, self.last_at) {
            (Some(sender), Some(at)) => Some(LastMessage {
                text: self.last_text.unwrap_or_default(),
                sender_id: UserId::parse(&sender)?,
                has_image: self.last_has_image,
                timestamp: decode_time(&at)?,
            }),
            _ => None,
        };

        let mut member_map = BTreeMap::new();
        for m in members {
            member_map.insert(
                UserId::parse(&m.user_id)?,
                MemberState {
                    archived: m.archived,
                    archived_at: m.archived_at.as_deref().map(decode_time).transpose()?,
                    muted: m.muted,
                },
            );
        }

        Ok(Chat {
            id: ChatId::parse(&self.id)?,
            participants: [UserId::parse(&self.buyer_id)?, UserId::parse(&self.seller_id)?],
            seller_id: UserId::parse(&self.seller_id)?,
            listing_id: ListingId::parse(&self.listing_id)?,
            listing: ListingSnapshot {
                name: self.listing_name,
                price: self.listing_price,
                thumbnail: self.listing_image,
            },
            created_at: decode_time(&self.created_at)?,
            last_message,
            members: member_map,
        })
    }
}

impl MemberRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chat_id: row.get(0)?,
            user_id: row.get(1)?,
            archived: row.get(2)?,
            archived_at: row.get(3)?,
            muted: row.get(4)?,
        })
    }
}

impl MessageRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            chat_id: row.get(2)?,
            sender_id: row.get(3)?,
            sender_name: row.get(4)?,
            text: row.get(5)?,
            image_url: row.get(6)?,
            payload: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub fn into_model(self) -> Result<Message> {
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str::<StructuredPayload>)
            .transpose()
            .with_context(|| format!("corrupt payload on message {}", self.id))?;

        Ok(Message {
            id: MessageId::parse(&self.id)?,
            chat_id: ChatId::parse(&self.chat_id)?,
            sender_id: UserId::parse(&self.sender_id)?,
            sender_name: self.sender_name,
            text: self.text,
            image_url: self.image_url,
            payload,
            timestamp: decode_time(&self.created_at)?,
            seq: self.seq,
        })
    }
}

/// Fixed-width RFC 3339 so that lexical order in SQLite matches time order.
pub fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_time(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?;
    Ok(parsed.with_timezone(&Utc))
}
