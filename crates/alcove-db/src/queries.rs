use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use alcove_types::models::ChatScope;

use crate::Database;
use crate::models::{MessageRow, NewMessage, UserRow};

/// Shared SELECT head for message reads: the row plus the author's
/// public fields.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.channel_id, m.conversation_id, m.author_id,
           u.username, u.avatar_url,
           m.content, m.attachment_url, m.deleted, m.created_at, m.updated_at
    FROM messages m
    LEFT JOIN users u ON m.author_id = u.id";

fn scope_column(scope: &ChatScope) -> &'static str {
    match scope {
        ChatScope::Channel { .. } => "channel_id",
        ChatScope::Conversation { .. } => "conversation_id",
    }
}

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                params![id, username, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password, avatar_url, created_at
                 FROM users WHERE username = ?1",
                username,
            )
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password, avatar_url, created_at
                 FROM users WHERE id = ?1",
                id,
            )
        })
    }

    // -- Chats --

    pub fn insert_channel(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, name) VALUES (?1, ?2)",
                params![id, name],
            )?;
            Ok(())
        })
    }

    pub fn insert_conversation(&self, id: &str, member_one: &str, member_two: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, member_one_id, member_two_id)
                 VALUES (?1, ?2, ?3)",
                params![id, member_one, member_two],
            )?;
            Ok(())
        })
    }

    /// True if the channel or conversation the scope points at exists.
    pub fn chat_exists(&self, scope: &ChatScope) -> Result<bool> {
        let table = match scope {
            ChatScope::Channel { .. } => "channels",
            ChatScope::Conversation { .. } => "conversations",
        };
        let id = scope.chat_id().to_string();
        self.with_conn(|conn| {
            let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
            let found: Option<i64> = conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
            Ok(found.is_some())
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (id, channel_id, conversation_id, author_id,
                      content, attachment_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    msg.id,
                    msg.channel_id,
                    msg.conversation_id,
                    msg.author_id,
                    msg.content,
                    msg.attachment_url,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let row = conn
                .query_row(&sql, params![id], map_message_row)
                .optional()?;
            Ok(row)
        })
    }

    /// One page of messages for a chat, newest first with id as the
    /// tie-break, strictly below the cursor row when a cursor is given.
    /// A cursor naming a row that no longer exists in this chat yields an
    /// empty page.
    pub fn list_messages(
        &self,
        scope: &ChatScope,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_message_page(conn, scope, cursor, limit))
    }

    /// Single-row probe at an absolute offset within the chat's
    /// newest-first order. None past the end of history.
    pub fn message_at_offset(&self, scope: &ChatScope, offset: i64) -> Result<Option<MessageRow>> {
        let col = scope_column(scope);
        let chat_id = scope.chat_id().to_string();
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.{col} = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT 1 OFFSET ?2"
            );
            let row = conn
                .query_row(&sql, params![chat_id, offset], map_message_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Replace a message's content, bumping updated_at. False when no
    /// such row exists.
    pub fn update_message_content(&self, id: &str, content: &str, updated_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, updated_at],
            )?;
            Ok(n > 0)
        })
    }

    /// Soft delete: flip the flag and blank the renderable fields. The
    /// row keeps its position in the feed.
    pub fn soft_delete_message(&self, id: &str, updated_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages
                 SET deleted = 1, content = NULL, attachment_url = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, updated_at],
            )?;
            Ok(n > 0)
        })
    }
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(sql, params![key], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                avatar_url: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn query_message_page(
    conn: &Connection,
    scope: &ChatScope,
    cursor: Option<&str>,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    let col = scope_column(scope);
    let chat_id = scope.chat_id().to_string();

    match cursor {
        Some(cursor_id) => {
            // Resolve the cursor row's position in this chat, then
            // continue strictly below it.
            let anchor_sql =
                format!("SELECT created_at, id FROM messages WHERE id = ?1 AND {col} = ?2");
            let anchor: Option<(String, String)> = conn
                .query_row(&anchor_sql, params![cursor_id, chat_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .optional()?;

            let Some((anchor_created, anchor_id)) = anchor else {
                return Ok(Vec::new());
            };

            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.{col} = ?1
                   AND (m.created_at < ?2 OR (m.created_at = ?2 AND m.id < ?3))
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![chat_id, anchor_created, anchor_id, limit],
                    map_message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        None => {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.{col} = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![chat_id, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        conversation_id: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row
            .get::<_, Option<String>>(4)?
            .unwrap_or_else(|| "unknown".to_string()),
        author_avatar_url: row.get(5)?,
        content: row.get(6)?,
        attachment_url: row.get(7)?,
        deleted: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
