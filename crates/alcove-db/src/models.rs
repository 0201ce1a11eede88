//! Row types mapping directly onto SQLite rows. Kept separate from the
//! wire models in alcove-types so the store layer stays string-typed and
//! conversion happens in one place, at the API boundary.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

/// A message row joined with its author's public fields.
pub struct MessageRow {
    pub id: String,
    pub channel_id: Option<String>,
    pub conversation_id: Option<String>,
    pub author_id: String,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert parameters for a new message. `updated_at` starts equal to
/// `created_at`.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub channel_id: Option<&'a str>,
    pub conversation_id: Option<&'a str>,
    pub author_id: &'a str,
    pub content: Option<&'a str>,
    pub attachment_url: Option<&'a str>,
    pub created_at: &'a str,
}
