use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// The channel every fresh install starts with.
pub const GENERAL_CHANNEL_ID: &str = "00000000-0000-0000-0000-000000000001";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar_url  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            member_one_id   TEXT NOT NULL REFERENCES users(id),
            member_two_id   TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per chat line, shared by channels and direct
        -- conversations. The CHECK keeps the two scope columns mutually
        -- exclusive. Deletion is a flag flip, rows never go away.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            channel_id      TEXT REFERENCES channels(id),
            conversation_id TEXT REFERENCES conversations(id),
            author_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT,
            attachment_url  TEXT,
            deleted         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            CHECK ((channel_id IS NULL) <> (conversation_id IS NULL))
        );

        -- Covering indexes for the feed's newest-first scans.
        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at DESC, id DESC);

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at DESC, id DESC);

        -- Seed the default general channel
        INSERT OR IGNORE INTO channels (id, name)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
