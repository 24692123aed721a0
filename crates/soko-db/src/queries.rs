use std::collections::HashMap;

use anyhow::Result;
use chrono::{SubsecRound, Utc};
use rusqlite::{Connection, params};

use soko_types::models::{Chat, Listing, MemberState, Message, MessageCursor};
use soko_types::{ChatId, ListingId, MessageId, UserId};

use crate::Database;
use crate::models::{
    CHAT_COLUMNS, ChatRow, ListingRow, MESSAGE_COLUMNS, MemberRow, MessageRow, decode_time,
    encode_time,
};
use crate::store::{ChatStore, ListingDirectory, MessageDraft, MessageStore};

impl Database {
    // -- Listings --

    /// Mirrors a listing published by the marketplace into the local directory.
    pub fn upsert_listing(&self, listing: &Listing) -> Result<()> {
        let images = serde_json::to_string(&listing.images)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (id, owner_id, title, price, images)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    title = excluded.title,
                    price = excluded.price,
                    images = excluded.images",
                params![
                    listing.id.to_string(),
                    listing.owner_id.to_string(),
                    listing.title,
                    listing.price,
                    images
                ],
            )?;
            Ok(())
        })
    }
}

impl ListingDirectory for Database {
    fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, owner_id, title, price, images FROM listings WHERE id = ?1",
                    [listing_id.to_string()],
                    ListingRow::from_row,
                )
                .optional()?;
            row.map(ListingRow::into_model).transpose()
        })
    }
}

impl ChatStore for Database {
    fn create_chat(&self, chat: &Chat) -> Result<Chat> {
        let [buyer, seller] = chat.participants;
        let (lo, hi) = if buyer <= seller { (buyer, seller) } else { (seller, buyer) };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT INTO chats (id, buyer_id, seller_id, participant_lo, participant_hi,
                                    listing_id, listing_name, listing_price, listing_image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(participant_lo, participant_hi, listing_id) DO NOTHING",
                params![
                    chat.id.to_string(),
                    buyer.to_string(),
                    seller.to_string(),
                    lo.to_string(),
                    hi.to_string(),
                    chat.listing_id.to_string(),
                    chat.listing.name,
                    chat.listing.price,
                    chat.listing.thumbnail,
                    encode_time(chat.created_at),
                ],
            )?;

            if inserted == 1 {
                for uid in chat.participants {
                    let member = chat.member(uid);
                    tx.execute(
                        "INSERT INTO chat_members (chat_id, user_id, archived, archived_at, muted)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            chat.id.to_string(),
                            uid.to_string(),
                            member.archived,
                            member.archived_at.map(encode_time),
                            member.muted
                        ],
                    )?;
                }
            }

            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats
                 WHERE participant_lo = ?1 AND participant_hi = ?2 AND listing_id = ?3"
            );
            let row = tx.query_row(
                &sql,
                params![lo.to_string(), hi.to_string(), chat.listing_id.to_string()],
                ChatRow::from_row,
            )?;
            let stored = hydrate_chats(&tx, vec![row])?.pop();
            tx.commit()?;

            stored.ok_or_else(|| anyhow::anyhow!("chat vanished inside its own transaction"))
        })
    }

    fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1");
            let row = conn
                .query_row(&sql, [chat_id.to_string()], ChatRow::from_row)
                .optional()?;
            Ok(hydrate_chats(conn, row.into_iter().collect())?.pop())
        })
    }

    fn find_chat(&self, participant: UserId, listing_id: ListingId) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats
                 WHERE listing_id = ?1 AND (buyer_id = ?2 OR seller_id = ?2)
                 ORDER BY created_at
                 LIMIT 1"
            );
            let row = conn
                .query_row(
                    &sql,
                    params![listing_id.to_string(), participant.to_string()],
                    ChatRow::from_row,
                )
                .optional()?;
            Ok(hydrate_chats(conn, row.into_iter().collect())?.pop())
        })
    }

    fn chats_for_user(&self, user_id: UserId) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats
                 JOIN chat_members ON chat_members.chat_id = chats.id
                 WHERE chat_members.user_id = ?1
                 ORDER BY COALESCE(last_at, created_at) DESC, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], ChatRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            hydrate_chats(conn, rows)
        })
    }

    fn update_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        state: &MemberState,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chat_members SET archived = ?1, archived_at = ?2, muted = ?3
                 WHERE chat_id = ?4 AND user_id = ?5",
                params![
                    state.archived,
                    state.archived_at.map(encode_time),
                    state.muted,
                    chat_id.to_string(),
                    user_id.to_string()
                ],
            )?;
            Ok(changed > 0)
        })
    }

    fn delete_chat(&self, chat_id: ChatId) -> Result<bool> {
        self.with_conn(|conn| {
            // Members and any leftover messages go with it (ON DELETE CASCADE).
            let changed = conn.execute("DELETE FROM chats WHERE id = ?1", [chat_id.to_string()])?;
            Ok(changed > 0)
        })
    }
}

impl MessageStore for Database {
    fn append_message(&self, draft: &MessageDraft) -> Result<Option<Message>> {
        let payload = draft.payload.as_ref().map(serde_json::to_string).transpose()?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let chat_id = draft.chat_id.to_string();

            let exists = tx
                .query_row("SELECT 1 FROM chats WHERE id = ?1", [&chat_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            let latest: Option<String> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE chat_id = ?1",
                [&chat_id],
                |row| row.get(0),
            )?;
            // Stored with microsecond precision
            let now = Utc::now().trunc_subsecs(6);
            let timestamp = match latest.as_deref().map(decode_time).transpose()? {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            let encoded = encode_time(timestamp);

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, sender_name, text, image_url, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    draft.id.to_string(),
                    chat_id,
                    draft.sender_id.to_string(),
                    draft.sender_name,
                    draft.text,
                    draft.image_url,
                    payload,
                    encoded
                ],
            )?;
            let seq = tx.last_insert_rowid();

            tx.execute(
                "UPDATE chats SET last_text = ?1, last_sender_id = ?2, last_has_image = ?3, last_at = ?4
                 WHERE id = ?5",
                params![
                    draft.text,
                    draft.sender_id.to_string(),
                    draft.image_url.is_some(),
                    encoded,
                    chat_id
                ],
            )?;
            tx.commit()?;

            Ok(Some(Message {
                id: draft.id,
                chat_id: draft.chat_id,
                sender_id: draft.sender_id,
                sender_name: draft.sender_name.clone(),
                text: draft.text.clone(),
                image_url: draft.image_url.clone(),
                payload: draft.payload.clone(),
                timestamp,
                seq,
            }))
        })
    }

    fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1
                 ORDER BY created_at, seq"
            );
            query_messages(conn, &sql, params![chat_id.to_string()])
        })
    }

    fn list_messages_since(&self, chat_id: ChatId, after: MessageCursor) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1 AND (created_at > ?2 OR (created_at = ?2 AND seq > ?3))
                 ORDER BY created_at, seq"
            );
            query_messages(
                conn,
                &sql,
                params![chat_id.to_string(), encode_time(after.timestamp), after.seq],
            )
        })
    }

    fn message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM messages WHERE chat_id = ?1 ORDER BY seq")?;
            let raw = stmt
                .query_map([chat_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw.iter()
                .map(|id| MessageId::parse(id).map_err(Into::into))
                .collect()
        })
    }

    fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND chat_id = ?2",
                params![message_id.to_string(), chat_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, MessageRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(MessageRow::into_model).collect()
}

/// Attaches member rows to chat rows with one batched lookup.
fn hydrate_chats(conn: &Connection, rows: Vec<ChatRow>) -> Result<Vec<Chat>> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=rows.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT chat_id, user_id, archived, archived_at, muted FROM chat_members
         WHERE chat_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = rows
        .iter()
        .map(|r| &r.id as &dyn rusqlite::types::ToSql)
        .collect();
    let member_rows = stmt
        .query_map(params.as_slice(), MemberRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_chat: HashMap<String, Vec<MemberRow>> = HashMap::new();
    for m in member_rows {
        by_chat.entry(m.chat_id.clone()).or_default().push(m);
    }

    rows.into_iter()
        .map(|row| {
            let members = by_chat.remove(&row.id).unwrap_or_default();
            row.into_model(members)
        })
        .collect()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
