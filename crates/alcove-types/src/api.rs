use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::LinkedMessage;

/// JWT claims shared by the REST middleware and the gateway Identify
/// handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub username: String,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Messages --

/// One fetched page: items newest-first plus the continuation cursor.
/// `nextCursor` is null exactly when the page fell short of the batch
/// size, meaning history is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub items: Vec<LinkedMessage>,
    pub next_cursor: Option<Uuid>,
}

/// Body for POST /api/messages and /api/direct-messages. At least one of
/// the two fields must be present and non-empty.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub attachment_url: Option<String>,
}

/// Body for PATCH on a single message.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}
