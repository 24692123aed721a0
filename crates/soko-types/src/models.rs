use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, ListingId, MessageId, UserId};

/// Title used for the snapshot when the listing has none.
pub const UNTITLED_LISTING: &str = "Untitled Listing";

/// Sender name recorded when the sender has no display name.
pub const ANONYMOUS_SENDER: &str = "Anonymous";

/// A listing as published by the marketplace. Owned by the listing service;
/// the chat service only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub title: Option<String>,
    pub price: Option<i64>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Display fields copied onto a chat when it is created.
///
/// This is a cache: it is never updated when the listing changes. Callers
/// that need current data go through `live_listing` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub name: String,
    pub price: i64,
    pub thumbnail: Option<String>,
}

impl ListingSnapshot {
    pub fn capture(listing: &Listing) -> Self {
        let name = listing
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_LISTING)
            .to_string();

        Self {
            name,
            price: listing.price.unwrap_or(0),
            thumbnail: listing.images.first().cloned(),
        }
    }
}

/// Denormalized pointer to the newest message of a chat.
///
/// Image-only messages are recorded with an empty `text` and `has_image` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: UserId,
    pub has_image: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-participant view flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    /// `[buyer, seller]`. Membership checks ignore the order.
    pub participants: [UserId; 2],
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub listing: ListingSnapshot,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<LastMessage>,
    pub members: BTreeMap<UserId, MemberState>,
}

impl Chat {
    pub fn new(
        buyer_id: UserId,
        seller_id: UserId,
        listing_id: ListingId,
        listing: ListingSnapshot,
        created_at: DateTime<Utc>,
    ) -> Self {
        let members = [buyer_id, seller_id]
            .into_iter()
            .map(|uid| (uid, MemberState::default()))
            .collect();

        Self {
            id: ChatId::new_v4(),
            participants: [buyer_id, seller_id],
            seller_id,
            listing_id,
            listing,
            created_at,
            last_message: None,
            members,
        }
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that is not `user_id`. `None` if `user_id` is not in the chat.
    pub fn counterpart(&self, user_id: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn member(&self, user_id: UserId) -> MemberState {
        self.members.get(&user_id).cloned().unwrap_or_default()
    }

    pub fn is_archived_for(&self, user_id: UserId) -> bool {
        self.member(user_id).archived
    }

    pub fn is_muted_for(&self, user_id: UserId) -> bool {
        self.member(user_id).muted
    }

    /// Sort key for chat lists: newest message, or creation time for empty chats.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }
}

/// Typed extension carried next to a message's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredPayload {
    PriceQuote { price: i64 },
    MeetingPoint { location: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    pub text: String,
    pub image_url: Option<String>,
    pub payload: Option<StructuredPayload>,
    pub timestamp: DateTime<Utc>,
    /// Store insertion order, breaks timestamp ties.
    pub seq: i64,
}

impl Message {
    /// Position of this message, for resuming a read after it.
    pub fn cursor(&self) -> MessageCursor {
        MessageCursor {
            timestamp: self.timestamp,
            seq: self.seq,
        }
    }

    pub fn preview(&self) -> String {
        if self.text.is_empty() && self.image_url.is_some() {
            "New message with image".to_string()
        } else {
            self.text.clone()
        }
    }
}

/// A point in a chat's `(timestamp, seq)` order. Reads resume strictly after it.
///
/// Timestamps are not unique within a chat, so a bare timestamp cannot tell
/// apart messages stamped with the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCursor {
    pub timestamp: DateTime<Utc>,
    pub seq: i64,
}

impl MessageCursor {
    /// Past every message stamped at or before `timestamp`.
    pub fn after_time(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            seq: i64::MAX,
        }
    }
}

/// Content of a message about to be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub payload: Option<StructuredPayload>,
}

impl NewMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn price_quote(price: i64) -> Self {
        Self {
            text: Some(format!("Price: {}", format_mwk(price))),
            image_url: None,
            payload: Some(StructuredPayload::PriceQuote { price }),
        }
    }

    pub fn meeting_point(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            text: Some(format!("Meeting at: {}", location)),
            image_url: None,
            payload: Some(StructuredPayload::MeetingPoint { location }),
        }
    }

    /// Trimmed text, `None` when blank.
    pub fn normalized_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn normalized_image_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Formats an amount in Malawian kwacha with thousands separators, e.g. `MWK 5,000`.
pub fn format_mwk(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if amount < 0 {
        format!("MWK -{}", grouped)
    } else {
        format!("MWK {}", grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: Option<&str>, price: Option<i64>, images: &[&str]) -> Listing {
        Listing {
            id: ListingId::new_v4(),
            owner_id: UserId::new_v4(),
            title: title.map(str::to_string),
            price,
            images: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn snapshot_falls_back_for_missing_fields() {
        let snap = ListingSnapshot::capture(&listing(None, None, &[]));
        assert_eq!(snap.name, UNTITLED_LISTING);
        assert_eq!(snap.price, 0);
        assert_eq!(snap.thumbnail, None);

        let snap = ListingSnapshot::capture(&listing(Some("  "), Some(10), &["a.png", "b.png"]));
        assert_eq!(snap.name, UNTITLED_LISTING);
        assert_eq!(snap.thumbnail.as_deref(), Some("a.png"));
    }

    #[test]
    fn formats_kwacha_with_separators() {
        assert_eq!(format_mwk(0), "MWK 0");
        assert_eq!(format_mwk(950), "MWK 950");
        assert_eq!(format_mwk(5000), "MWK 5,000");
        assert_eq!(format_mwk(1234567), "MWK 1,234,567");
        assert_eq!(format_mwk(-12000), "MWK -12,000");
    }

    #[test]
    fn builders_fill_text_and_payload() {
        let quote = NewMessage::price_quote(5000);
        assert_eq!(quote.text.as_deref(), Some("Price: MWK 5,000"));
        assert_eq!(quote.payload, Some(StructuredPayload::PriceQuote { price: 5000 }));

        let meet = NewMessage::meeting_point("Library steps");
        assert_eq!(meet.text.as_deref(), Some("Meeting at: Library steps"));
    }

    #[test]
    fn counterpart_is_order_independent() {
        let a = UserId::new_v4();
        let b = UserId::new_v4();
        let snap = ListingSnapshot::capture(&listing(Some("Desk"), Some(1), &[]));
        let chat = Chat::new(a, b, ListingId::new_v4(), snap, Utc::now());

        assert_eq!(chat.counterpart(a), Some(b));
        assert_eq!(chat.counterpart(b), Some(a));
        assert_eq!(chat.counterpart(UserId::new_v4()), None);
        assert!(!chat.is_archived_for(a));
    }

    #[test]
    fn payload_is_tagged() {
        let json = serde_json::to_value(StructuredPayload::PriceQuote { price: 5 }).unwrap();
        assert_eq!(json["kind"], "price_quote");
        assert_eq!(json["price"], 5);
    }
}
