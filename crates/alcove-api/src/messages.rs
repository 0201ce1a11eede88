use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use uuid::Uuid;

use alcove_db::models::NewMessage;
use alcove_types::api::{Claims, EditMessageRequest, MessagePage, SendMessageRequest};
use alcove_types::events::GatewayEvent;
use alcove_types::models::{AuthorProfile, ChatScope, Message};

use crate::error::ApiError;
use crate::{AppState, pagination};

fn default_page() -> u32 {
    1
}

/// Query parameters for the read endpoints. The page counter is
/// client-maintained and only feeds the neighbor probes.
#[derive(Debug, Deserialize)]
pub struct ChannelMessagesQuery {
    pub cursor: Option<Uuid>,
    #[serde(rename = "channelId")]
    pub channel_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct ConversationMessagesQuery {
    pub cursor: Option<Uuid>,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChannelScopeQuery {
    #[serde(rename = "channelId")]
    pub channel_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationScopeQuery {
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<Uuid>,
}

// -- Reads --

/// GET /api/messages: one page of channel history.
pub async fn get_channel_messages(
    State(state): State<AppState>,
    Query(query): Query<ChannelMessagesQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<MessagePage>, ApiError> {
    let channel_id = query.channel_id.ok_or(ApiError::MissingScope("Channel ID"))?;
    let page = pagination::fetch_page(
        &state,
        ChatScope::channel(channel_id),
        query.cursor,
        query.page,
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/direct-messages: one page of direct-conversation history.
pub async fn get_direct_messages(
    State(state): State<AppState>,
    Query(query): Query<ConversationMessagesQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<MessagePage>, ApiError> {
    let conversation_id = query
        .conversation_id
        .ok_or(ApiError::MissingScope("Conversation ID"))?;
    let page = pagination::fetch_page(
        &state,
        ChatScope::conversation(conversation_id),
        query.cursor,
        query.page,
    )
    .await?;
    Ok(Json(page))
}

// -- Writes --

/// POST /api/messages: post to a channel, then broadcast the creation so
/// live feeds pick it up without refetching.
pub async fn send_channel_message(
    State(state): State<AppState>,
    Query(query): Query<ChannelScopeQuery>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let channel_id = query.channel_id.ok_or(ApiError::MissingScope("Channel ID"))?;
    send_message(&state, ChatScope::channel(channel_id), claims, req).await
}

/// POST /api/direct-messages
pub async fn send_direct_message(
    State(state): State<AppState>,
    Query(query): Query<ConversationScopeQuery>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let conversation_id = query
        .conversation_id
        .ok_or(ApiError::MissingScope("Conversation ID"))?;
    send_message(&state, ChatScope::conversation(conversation_id), claims, req).await
}

/// PATCH /api/messages/{message_id}
pub async fn edit_channel_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<ChannelScopeQuery>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let channel_id = query.channel_id.ok_or(ApiError::MissingScope("Channel ID"))?;
    edit_message(&state, ChatScope::channel(channel_id), message_id, req).await
}

/// PATCH /api/direct-messages/{message_id}
pub async fn edit_direct_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<ConversationScopeQuery>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let conversation_id = query
        .conversation_id
        .ok_or(ApiError::MissingScope("Conversation ID"))?;
    edit_message(&state, ChatScope::conversation(conversation_id), message_id, req).await
}

/// DELETE /api/messages/{message_id}: soft delete. The row keeps its
/// feed position; clients receive it as an update event.
pub async fn delete_channel_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<ChannelScopeQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Message>, ApiError> {
    let channel_id = query.channel_id.ok_or(ApiError::MissingScope("Channel ID"))?;
    delete_message(&state, ChatScope::channel(channel_id), message_id).await
}

/// DELETE /api/direct-messages/{message_id}
pub async fn delete_direct_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<ConversationScopeQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Message>, ApiError> {
    let conversation_id = query
        .conversation_id
        .ok_or(ApiError::MissingScope("Conversation ID"))?;
    delete_message(&state, ChatScope::conversation(conversation_id), message_id).await
}

// -- Shared cores --

async fn send_message(
    state: &AppState,
    scope: ChatScope,
    claims: Claims,
    req: SendMessageRequest,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let has_content = req.content.as_deref().is_some_and(|c| !c.is_empty());
    if !has_content && req.attachment_url.is_none() {
        return Err(ApiError::BadRequest("Content missing".to_string()));
    }

    let author = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::Unauthorized)?;

    if !state.db.chat_exists(&scope)? {
        return Err(ApiError::NotFound(scope_noun(&scope)));
    }

    let message_id = Uuid::new_v4();
    let (now, now_str) = now_millis();

    let db = state.clone();
    let content = req.content.clone();
    let attachment_url = req.attachment_url.clone();
    let author_id = claims.sub.to_string();
    let chat_id = scope.chat_id().to_string();
    let id_str = message_id.to_string();
    let created_at = now_str.clone();
    tokio::task::spawn_blocking(move || {
        let (channel_id, conversation_id) = match scope {
            ChatScope::Channel { .. } => (Some(chat_id.as_str()), None),
            ChatScope::Conversation { .. } => (None, Some(chat_id.as_str())),
        };
        db.db.insert_message(NewMessage {
            id: &id_str,
            channel_id,
            conversation_id,
            author_id: &author_id,
            content: content.as_deref(),
            attachment_url: attachment_url.as_deref(),
            created_at: &created_at,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??;

    let message = Message {
        id: message_id,
        scope,
        author_id: claims.sub,
        content: req.content,
        attachment_url: req.attachment_url,
        deleted: false,
        created_at: now,
        updated_at: now,
        author: AuthorProfile {
            id: claims.sub,
            display_name: author.username,
            avatar_url: author.avatar_url,
        },
    };

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}

async fn edit_message(
    state: &AppState,
    scope: ChatScope,
    message_id: Uuid,
    req: EditMessageRequest,
) -> Result<Json<Message>, ApiError> {
    if req.content.is_empty() {
        return Err(ApiError::BadRequest("Content missing".to_string()));
    }

    let mut message = load_scoped_message(state, scope, message_id).await?;

    let (now, now_str) = now_millis();
    let db = state.clone();
    let id_str = message_id.to_string();
    let content = req.content.clone();
    let found = tokio::task::spawn_blocking(move || {
        db.db.update_message_content(&id_str, &content, &now_str)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??;
    if !found {
        return Err(ApiError::NotFound("Message"));
    }

    message.content = Some(req.content);
    message.updated_at = now;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate {
        message: message.clone(),
    });

    Ok(Json(message))
}

async fn delete_message(
    state: &AppState,
    scope: ChatScope,
    message_id: Uuid,
) -> Result<Json<Message>, ApiError> {
    let mut message = load_scoped_message(state, scope, message_id).await?;

    let (now, now_str) = now_millis();
    let db = state.clone();
    let id_str = message_id.to_string();
    let found =
        tokio::task::spawn_blocking(move || db.db.soft_delete_message(&id_str, &now_str))
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??;
    if !found {
        return Err(ApiError::NotFound("Message"));
    }

    message.deleted = true;
    message.content = None;
    message.attachment_url = None;
    message.updated_at = now;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate {
        message: message.clone(),
    });

    Ok(Json(message))
}

/// Load a message and check it belongs to the chat named in the request.
/// Ids from other chats read as not found.
async fn load_scoped_message(
    state: &AppState,
    scope: ChatScope,
    message_id: Uuid,
) -> Result<Message, ApiError> {
    let db = state.clone();
    let id_str = message_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_message(&id_str))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??
        .ok_or(ApiError::NotFound("Message"))?;

    let message = pagination::row_to_message(row);
    if message.scope != scope {
        return Err(ApiError::NotFound("Message"));
    }
    Ok(message)
}

fn scope_noun(scope: &ChatScope) -> &'static str {
    match scope {
        ChatScope::Channel { .. } => "Channel",
        ChatScope::Conversation { .. } => "Conversation",
    }
}

/// Wall-clock now, truncated to the millisecond precision the store
/// keeps, so live event payloads and later page reads carry identical
/// timestamps.
fn now_millis() -> (DateTime<Utc>, String) {
    let raw = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let parsed = raw.parse().unwrap_or_default();
    (parsed, raw)
}
