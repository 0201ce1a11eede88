use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use alcove_db::models::MessageRow;
use alcove_types::api::MessagePage;
use alcove_types::models::{AuthorProfile, ChatScope, LinkedMessage, Message, NeighborRef};

use crate::AppState;
use crate::error::ApiError;

/// Fixed page size for history reads. Shorter pages signal the end of
/// history; the continuation cursor is only set on full pages.
pub const MESSAGES_BATCH: u32 = 10;

/// Fetch one page for a chat: the page body, the continuation cursor,
/// and neighbor annotations sourced from two single-row boundary probes.
pub async fn fetch_page(
    state: &AppState,
    scope: ChatScope,
    cursor: Option<Uuid>,
    page_number: u32,
) -> Result<MessagePage, ApiError> {
    let db = state.clone();
    let cursor_id = cursor.map(|c| c.to_string());

    // Page body plus both boundary probes in a single trip off the
    // async runtime.
    let (rows, prev_row, next_row) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_messages(&scope, cursor_id.as_deref(), MESSAGES_BATCH)?;

        // Candidate last-of-previous-page and first-of-next-page, by
        // absolute offset from the caller's page counter. The counter can
        // drift from true positions while writes land between loads, in
        // which case boundary neighbors point one slot off until the next
        // refetch.
        let next_offset = i64::from(page_number) * i64::from(MESSAGES_BATCH);
        let prev_offset = ((i64::from(page_number) - 1) * i64::from(MESSAGES_BATCH) - 1).max(0);

        let first_of_next = db.db.message_at_offset(&scope, next_offset)?;
        let last_of_previous = db.db.message_at_offset(&scope, prev_offset)?;

        anyhow::Ok((rows, last_of_previous, first_of_next))
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??;

    let messages: Vec<Message> = rows.into_iter().map(row_to_message).collect();

    let next_cursor = if messages.len() as u32 == MESSAGES_BATCH {
        messages.last().map(|m| m.id)
    } else {
        None
    };

    let last_of_previous = prev_row.map(|row| NeighborRef::from(&row_to_message(row)));
    let first_of_next = next_row.map(|row| NeighborRef::from(&row_to_message(row)));

    let items = link_neighbors(messages, page_number, last_of_previous, first_of_next);

    Ok(MessagePage { items, next_cursor })
}

/// Attach prev/next references to every item of a page. Interior items
/// link to their page-adjacent slots; boundary items borrow from the
/// probe rows. For a single-item page the head rule wins, so its
/// `prev_message` stays unset rather than borrowing the next-page probe.
fn link_neighbors(
    messages: Vec<Message>,
    page_number: u32,
    last_of_previous: Option<NeighborRef>,
    first_of_next: Option<NeighborRef>,
) -> Vec<LinkedMessage> {
    let n = messages.len();
    let is_first_page = page_number == 1;
    let is_last_page = n as u32 != MESSAGES_BATCH;

    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let (prev_message, next_message) = if i == 0 {
                let next = if is_first_page {
                    None
                } else {
                    last_of_previous.clone()
                };
                (messages.get(i + 1).map(NeighborRef::from), next)
            } else if i == n - 1 {
                let prev = if is_last_page {
                    None
                } else {
                    first_of_next.clone()
                };
                (prev, messages.get(i - 1).map(NeighborRef::from))
            } else {
                (
                    messages.get(i + 1).map(NeighborRef::from),
                    messages.get(i - 1).map(NeighborRef::from),
                )
            };

            LinkedMessage {
                message: message.clone(),
                prev_message,
                next_message,
            }
        })
        .collect()
}

/// Convert a store row into the wire model. Field-level corruption is
/// logged and defaulted rather than failing the whole page.
pub(crate) fn row_to_message(row: MessageRow) -> Message {
    let id = row.id.parse().unwrap_or_else(|e| {
        warn!("Corrupt message id '{}': {}", row.id, e);
        Uuid::default()
    });

    let author_id: Uuid = row.author_id.parse().unwrap_or_else(|e| {
        warn!("Corrupt author id '{}' on message '{}': {}", row.author_id, row.id, e);
        Uuid::default()
    });

    let scope = match (&row.channel_id, &row.conversation_id) {
        (Some(channel_id), _) => ChatScope::channel(parse_chat_id(channel_id, &row.id)),
        (None, Some(conversation_id)) => {
            ChatScope::conversation(parse_chat_id(conversation_id, &row.id))
        }
        (None, None) => {
            warn!("Message '{}' has no scope column set", row.id);
            ChatScope::channel(Uuid::default())
        }
    };

    Message {
        id,
        scope,
        author_id,
        content: row.content,
        attachment_url: row.attachment_url,
        deleted: row.deleted,
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        author: AuthorProfile {
            id: author_id,
            display_name: row.author_username,
            avatar_url: row.author_avatar_url,
        },
    }
}

fn parse_chat_id(raw: &str, message_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt chat id '{}' on message '{}': {}", raw, message_id, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, message_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') default is "YYYY-MM-DD HH:MM:SS"
            // with no timezone. Treat it as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message '{}': {}", raw, message_id, e);
            DateTime::default()
        })
}
