use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (chats, messages, listings)");
        conn.execute_batch(
            "
            CREATE TABLE listings (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL,
                title       TEXT,
                price       INTEGER,
                images      TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE chats (
                id              TEXT PRIMARY KEY,
                buyer_id        TEXT NOT NULL,
                seller_id       TEXT NOT NULL,
                participant_lo  TEXT NOT NULL,
                participant_hi  TEXT NOT NULL,
                listing_id      TEXT NOT NULL,
                listing_name    TEXT NOT NULL,
                listing_price   INTEGER NOT NULL,
                listing_image   TEXT,
                created_at      TEXT NOT NULL,
                last_text       TEXT,
                last_sender_id  TEXT,
                last_has_image  INTEGER NOT NULL DEFAULT 0,
                last_at         TEXT,
                UNIQUE(participant_lo, participant_hi, listing_id)
            );

            CREATE INDEX idx_chats_listing ON chats(listing_id);

            CREATE TABLE chat_members (
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                archived    INTEGER NOT NULL DEFAULT 0,
                archived_at TEXT,
                muted       INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX idx_chat_members_user ON chat_members(user_id);

            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL,
                sender_name TEXT,
                text        TEXT NOT NULL,
                image_url   TEXT,
                payload     TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
